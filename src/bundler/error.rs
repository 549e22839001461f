//! Error types for package builds and release composition.
//!
//! Every failure the orchestrator can surface lives in [`Error`]. Configuration
//! errors abort a graph build before any stage runs, stage errors are scoped to
//! one package and everything that depends on it.

use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::bundler::pipeline::PipelineStage;

/// Result type alias for bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for package builds.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Declared dependencies form a cycle.
    #[error("dependency cycle between `{from}` and `{to}` in {}", .dir.display())]
    DependencyCycle {
        /// Directory whose declaration file introduced the cycle
        dir: PathBuf,
        /// Package that depends on `to`
        from: String,
        /// Package that (transitively) depends back on `from`
        to: String,
    },

    /// A declared dependency is not a discovered sub-package.
    #[error("package `{package}` depends on unknown package `{dependency}` in {}", .dir.display())]
    UnknownDependency {
        /// Directory that was scanned
        dir: PathBuf,
        /// Declaring package (or `*`)
        package: String,
        /// The name that could not be found
        dependency: String,
    },

    /// The dependency declaration file is malformed.
    #[error("invalid dependency declaration {}: {reason}", .path.display())]
    InvalidDeclaration {
        /// Declaration file
        path: PathBuf,
        /// Parse failure
        reason: String,
    },

    /// A secondary entry point tried to declare entry points of its own.
    #[error("entry point `{0}` is nested more than one level deep")]
    NestedEntryPoint(String),

    /// A required compiler setting could not be derived for a package.
    #[error("missing compiler setting `{setting}` for package `{package}`")]
    MissingCompilerSetting {
        /// Package import name
        package: String,
        /// Name of the missing setting
        setting: &'static str,
    },

    /// The compiler configuration template is malformed.
    #[error("invalid compiler configuration template {}: {reason}", .path.display())]
    InvalidCompilerConfig {
        /// Template path
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// The ahead-of-time compiler reported diagnostics.
    #[error("compilation of `{package}` failed: {message}")]
    CompilationFailed {
        /// Package import name
        package: String,
        /// Compiler output
        message: String,
    },

    /// A pipeline stage failed for a package.
    #[error("stage `{stage}` failed for `{package}`: {source}")]
    StageFailed {
        /// Failing stage
        stage: PipelineStage,
        /// Package import name
        package: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// The build was skipped because a dependency failed.
    #[error("`{package}` not built: dependency `{dependency}` failed")]
    DependencyFailed {
        /// Package that was skipped
        package: String,
        /// Dependency whose build record rejected
        dependency: String,
    },

    /// One or more packages of a graph build failed.
    #[error("{}", BuildFailures(.failures))]
    BuildFailed {
        /// Root-cause failures, one per failed package
        failures: Vec<(String, Arc<Error>)>,
    },

    /// Several files share a referenced resource file name.
    #[error("ambiguous resource `{file_name}`: {}", join_paths(.candidates))]
    AmbiguousResource {
        /// Bare file name referenced by metadata
        file_name: String,
        /// All matching files
        candidates: Vec<PathBuf>,
    },

    /// A referenced resource file does not exist in the package tree.
    #[error("resource `{file_name}` referenced by {} not found", .metadata.display())]
    MissingResource {
        /// Bare file name referenced by metadata
        file_name: String,
        /// Metadata file containing the reference
        metadata: PathBuf,
    },

    /// Sourcemap parse or chain error.
    #[error("sourcemap error in {}: {reason}", .path.display())]
    Sourcemap {
        /// Map or generated file
        path: PathBuf,
        /// Failure description
        reason: String,
    },

    /// External tool could not be located.
    #[error("required tool `{0}` not found in PATH")]
    ToolNotFound(String),

    /// External tool could not be spawned.
    #[error("failed to run `{command}`: {error}")]
    CommandFailed {
        /// Command name
        command: String,
        /// Spawn error
        error: std::io::Error,
    },

    /// External tool ran but exited unsuccessfully.
    #[error("`{tool}` exited with {status}: {stderr}")]
    ToolFailed {
        /// Tool name
        tool: String,
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// The graph build was aborted by the caller.
    #[error("build cancelled")]
    Cancelled,

    /// Filesystem error with context.
    #[error("{context} {}: {error}", .path.display())]
    Fs {
        /// What was being done
        context: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        error: std::io::Error,
    },

    /// Plain I/O error.
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// Invalid glob pattern.
    #[error("{0}")]
    Glob(#[from] glob::PatternError),

    /// Error while iterating glob matches.
    #[error("{0}")]
    GlobIo(#[from] glob::GlobError),

    /// Error while walking a directory tree.
    #[error("{0}")]
    WalkDir(#[from] walkdir::Error),

    /// Path prefix stripping error.
    #[error("{0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// Generic error.
    #[error("{0}")]
    GenericError(String),
}

impl Error {
    /// Whether this error stems from the package configuration rather than a build.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::DependencyCycle { .. }
                | Error::UnknownDependency { .. }
                | Error::InvalidDeclaration { .. }
                | Error::NestedEntryPoint(_)
                | Error::MissingCompilerSetting { .. }
                | Error::InvalidCompilerConfig { .. }
        )
    }
}

struct BuildFailures<'a>(&'a [(String, Arc<Error>)]);

impl Display for BuildFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            [] => write!(f, "build failed"),
            [(_, first)] => write!(f, "{first}"),
            [(_, first), rest @ ..] => write!(f, "{first} (and {} more failures)", rest.len()),
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenient type alias of Result type for filesystem operations.
pub trait ErrorExt<T> {
    /// Add a context and path to an I/O error.
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.as_ref().to_path_buf(),
            error,
        })
    }
}

/// Attach a message to a missing value.
pub trait Context<T> {
    /// Turn `None` into a [`Error::GenericError`] with the given message.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }
}

/// Return early with a [`Error::GenericError`].
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::Error::GenericError($msg.into()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($fmt, $($arg)*)))
    };
}
