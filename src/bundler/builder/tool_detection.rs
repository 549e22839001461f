//! External tool detection.
//!
//! Node.js tools are normally installed per project, so the project's
//! `node_modules/.bin` is searched before `PATH`.

use std::path::{Path, PathBuf};

use crate::bundler::error::{Error, Result};

/// Directory holding a project's locally installed tool binaries.
pub fn local_bin_dir(project_root: &Path) -> PathBuf {
    project_root.join("node_modules").join(".bin")
}

/// Locates `name`, preferring the project-local installation.
///
/// # Errors
///
/// [`Error::ToolNotFound`] when the tool is neither installed locally nor on
/// `PATH`.
pub fn find_tool(name: &str, project_root: &Path) -> Result<PathBuf> {
    let local = local_bin_dir(project_root);
    match which::which_in(name, Some(&local), project_root) {
        Ok(path) => {
            log::debug!("Found {} at: {}", name, path.display());
            return Ok(path);
        }
        Err(e) => {
            log::debug!("{} not found in {}: {}", name, local.display(), e);
        }
    }

    match which::which(name) {
        Ok(path) => {
            log::debug!("Found {} on PATH at: {}", name, path.display());
            Ok(path)
        }
        Err(e) => {
            log::warn!("{} not found in PATH: {}", name, e);
            Err(Error::ToolNotFound(name.to_string()))
        }
    }
}
