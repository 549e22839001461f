//! Error types for the command line tool.
//!
//! This module wraps the library's [`crate::bundler::Error`] together with
//! argument and project metadata failures, each with actionable suggestions.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Main error type for all CLI operations
#[derive(Error, Debug)]
pub enum BundlerError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bundler errors
    #[error("Bundler error: {0}")]
    Bundler(#[from] crate::bundler::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Project metadata could not be read
    #[error("Invalid project metadata {}: {reason}", .path.display())]
    InvalidMetadata {
        /// `package.json` that was read
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl BundlerError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        use crate::bundler::Error as E;

        match self {
            BundlerError::Bundler(E::ToolNotFound(tool)) => vec![
                format!("Install `{tool}` in the project (npm install) or put it on PATH"),
            ],
            BundlerError::Bundler(e) if e.is_configuration_error() => vec![
                "Check the package-config.json files of the package sources".to_string(),
                "Every entry point directory needs an entry file (index.ts)".to_string(),
            ],
            BundlerError::Bundler(E::AmbiguousResource { file_name, .. }) => vec![format!(
                "Rename one of the `{file_name}` files so component resources are unique"
            )],
            BundlerError::Cli(CliError::InvalidMetadata { path, .. }) => vec![format!(
                "Make sure {} is valid JSON with `name` and `version` fields",
                path.display()
            )],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Check if this error is recoverable by re-running without changing inputs
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BundlerError::Bundler(crate::bundler::Error::Cancelled))
    }
}
