//! File system utilities for release composition.
//!
//! Provides file operations with automatic directory creation and glob-based
//! copy and rename helpers.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

/// Creates all of the directories of the specified path, erasing it first if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        remove_dir_all(path).await?;
    }

    // create_dir_all is already idempotent - succeeds even if dir exists
    fs::create_dir_all(path)
        .await
        .fs_context("creating directory", path)
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()), // Idempotent
        Err(e) => Err(e).fs_context("removing directory", path),
    }
}

/// Copies a regular file from one path to another, creating any parent
/// directories of the destination path as necessary.
///
/// Fails if the source path is a directory or doesn't exist.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.exists() {
        return Err(Error::GenericError(format!("{from:?} does not exist")));
    }
    if !from.is_file() {
        return Err(Error::GenericError(format!("{from:?} is not a file")));
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("creating directory", dest_dir)?;
    }
    fs::copy(from, to).await.fs_context("copying file", from)?;
    Ok(())
}

/// Copies every file under `from` matching `pattern` into `to`, preserving
/// relative paths.
///
/// `pattern` is a glob relative to `from`, e.g. `**/*.d.ts`. Returns the
/// copied destination paths.
pub async fn copy_files(from: &Path, pattern: &str, to: &Path) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for source in glob_files(from, pattern).await? {
        let dest = to.join(source.strip_prefix(from)?);
        copy_file(&source, &dest).await?;
        copied.push(dest);
    }
    log::debug!(
        "Copied {} files matching {} from {} to {}",
        copied.len(),
        pattern,
        from.display(),
        to.display()
    );
    Ok(copied)
}

/// Renames every file under `dir` matching `pattern` to `new_name`, keeping
/// it in its directory.
pub async fn rename_files(dir: &Path, pattern: &str, new_name: &str) -> Result<Vec<PathBuf>> {
    let mut renamed = Vec::new();
    for source in glob_files(dir, pattern).await? {
        let dest = source.with_file_name(new_name);
        fs::rename(&source, &dest)
            .await
            .fs_context("renaming file", &source)?;
        renamed.push(dest);
    }
    Ok(renamed)
}

/// Files under `dir` matching the relative glob `pattern`, sorted.
pub async fn glob_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dir.join(pattern).to_string_lossy().into_owned();

    // Offload blocking directory iteration to dedicated thread pool
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in glob::glob(&full)? {
            let path = entry?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    })
    .await
    .map_err(|e| Error::GenericError(format!("Glob task panicked: {e}")))?
}

/// Recursively collects the files under `dir` for which `keep` returns true.
pub async fn walk_files<F>(dir: &Path, keep: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool + Send + 'static,
{
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && keep(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    })
    .await
    .map_err(|e| Error::GenericError(format!("Directory walk task panicked: {e}")))?
}
