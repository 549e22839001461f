//! Core BuildSettings struct and implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main settings for package builds.
///
/// Central configuration for the orchestrator, constructed via
/// [`BuildSettingsBuilder`](super::BuildSettingsBuilder). Holds the project
/// layout, naming conventions for derived module/import names, the external
/// globals table used by both bundle formats, and the release version.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_package::bundler::BuildSettingsBuilder;
///
/// # fn example() -> kodegen_bundler_package::bundler::Result<()> {
/// let settings = BuildSettingsBuilder::new()
///     .project_root(".")
///     .package_name("material")
///     .package_source("src/lib")
///     .version("2.0.0-beta.8")
///     .build()?;
/// assert_eq!(settings.scope(), "@angular");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BuildSettings {
    /// Project root (holds `LICENSE` and the root `package.json`).
    project_root: PathBuf,

    /// Directory holding the README copied into the release.
    source_root: PathBuf,

    /// Name of the primary package.
    package_name: String,

    /// Source directory of the primary package.
    package_source: PathBuf,

    /// Root of every generated output.
    dist_root: PathBuf,

    /// Import scope, e.g. `@angular`.
    scope: String,

    /// Global namespace prefix for UMD module names, e.g. `ng`.
    namespace: String,

    /// Version written into the release `package.json`.
    version: String,

    /// License banner prepended to UMD bundles and the root typings file.
    license_banner: String,

    /// External module id to global variable name.
    globals: BTreeMap<String, String>,

    /// File whose presence marks a directory as an entry point.
    entry_file: String,

    /// Per-directory dependency declaration file.
    dependency_file: String,

    /// Optional compiler configuration template in the primary source directory.
    compiler_template: String,

    /// Upper bound on concurrently running package pipelines.
    ///
    /// None means the dependency graph alone limits concurrency.
    max_concurrent_builds: Option<usize>,
}

impl BuildSettings {
    /// Returns the project root.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Returns the directory containing the README.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Returns the primary package name.
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Returns the source directory of the primary package.
    pub fn package_source(&self) -> &Path {
        &self.package_source
    }

    /// Returns the dist root.
    pub fn dist_root(&self) -> &Path {
        &self.dist_root
    }

    /// Directory where every bundle is written before release composition.
    pub fn bundles_dir(&self) -> PathBuf {
        self.dist_root.join("bundles")
    }

    /// Directory holding compiled ES-module output per package.
    pub fn packages_dir(&self) -> PathBuf {
        self.dist_root.join("packages")
    }

    /// Directory holding composed releases.
    pub fn releases_dir(&self) -> PathBuf {
        self.dist_root.join("releases")
    }

    /// Directory holding materialized per-package compiler configurations.
    pub fn compiler_config_dir(&self) -> PathBuf {
        self.dist_root.join("tsconfig")
    }

    /// Returns the import scope.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Returns the UMD namespace prefix.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the release version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the license banner.
    pub fn license_banner(&self) -> &str {
        &self.license_banner
    }

    /// Returns the external→global table.
    pub fn globals(&self) -> &BTreeMap<String, String> {
        &self.globals
    }

    /// Returns the entry file name.
    pub fn entry_file(&self) -> &str {
        &self.entry_file
    }

    /// Returns the dependency declaration file name.
    pub fn dependency_file(&self) -> &str {
        &self.dependency_file
    }

    /// Path of the compiler configuration template (may not exist).
    pub fn compiler_template_path(&self) -> PathBuf {
        self.package_source.join(&self.compiler_template)
    }

    /// Returns the pipeline concurrency limit.
    pub fn max_concurrent_builds(&self) -> Option<usize> {
        self.max_concurrent_builds
    }

    /// Creates a new BuildSettings instance (used by BuildSettingsBuilder).
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        project_root: PathBuf,
        source_root: PathBuf,
        package_name: String,
        package_source: PathBuf,
        dist_root: PathBuf,
        scope: String,
        namespace: String,
        version: String,
        license_banner: String,
        globals: BTreeMap<String, String>,
        entry_file: String,
        dependency_file: String,
        compiler_template: String,
        max_concurrent_builds: Option<usize>,
    ) -> Self {
        Self {
            project_root,
            source_root,
            package_name,
            package_source,
            dist_root,
            scope,
            namespace,
            version,
            license_banner,
            globals,
            entry_file,
            dependency_file,
            compiler_template,
            max_concurrent_builds,
        }
    }
}
