//! Project metadata from the root `package.json`.

use crate::error::{BundlerError, CliError, Result};
use serde::Deserialize;
use std::path::Path;

/// Project metadata extracted from `package.json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectMetadata {
    /// Package name (e.g., "@angular/material")
    pub name: String,

    /// Package version (e.g., "2.0.0-beta.8")
    pub version: String,

    /// SPDX license identifier (e.g., "MIT")
    #[serde(default)]
    pub license: Option<String>,
}

impl ProjectMetadata {
    /// License header placed at the top of every bundle and the root typings.
    pub fn license_banner(&self, package: &str) -> String {
        format!(
            "/**\n  * @license {} v{}\n  * License: {}\n  */",
            package,
            self.version,
            self.license.as_deref().unwrap_or("MIT")
        )
    }
}

/// Load project metadata from `package.json`
///
/// The version must be a valid semantic version since it replaces the
/// placeholder of released `package.json` files.
pub async fn load_project_metadata(package_json: &Path) -> Result<ProjectMetadata> {
    let invalid = |reason: String| {
        BundlerError::Cli(CliError::InvalidMetadata {
            path: package_json.to_path_buf(),
            reason,
        })
    };

    // Step 1: Read file once
    let json = tokio::fs::read_to_string(package_json)
        .await
        .map_err(|e| invalid(format!("failed to read: {e}")))?;

    // Step 2: Parse into the typed view
    let metadata: ProjectMetadata =
        serde_json::from_str(&json).map_err(|e| invalid(e.to_string()))?;

    // Step 3: Validate the version
    semver::Version::parse(&metadata.version)
        .map_err(|e| invalid(format!("invalid version `{}`: {e}", metadata.version)))?;

    log::debug!("Project {} v{}", metadata.name, metadata.version);
    Ok(metadata)
}
