//! Release directory composition.
//!
//! Runs once after every entry point of a graph has been built and lays out
//! the publishable package:
//!
//! ```text
//! releases/<name>/
//! ├── bundles/            UMD and minified UMD bundles of every entry point
//! ├── <scope>/            flat ES2015 and ES5 bundles
//! │   └── <name>/         ... of the secondary entry points
//! ├── typings/            declarations and compiler metadata
//! ├── <secondary>/package.json
//! ├── <name>.d.ts         root typings re-export
//! ├── <name>.metadata.json
//! ├── LICENSE
//! ├── README.md
//! └── package.json
//! ```

pub mod inline;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::bundler::{
    BuildSettings, Error, Result,
    error::ErrorExt,
    graph::{EntryPoint, PackageGraph},
    pipeline::{BundleArtifacts, map_path},
    utils::fs::{copy_file, copy_files, create_dir_all, rename_files},
};

pub use inline::{ResourceMap, inline_package_metadata};

/// Version string replaced by the release version in `package.json`.
pub const VERSION_PLACEHOLDER: &str = "0.0.0-PLACEHOLDER";

/// Descriptor that makes a secondary entry point importable on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecondaryPackageJson {
    pub name: String,
    pub typings: String,
    pub main: String,
    pub module: String,
    pub es2015: String,
}

impl SecondaryPackageJson {
    /// Descriptor of `secondary`, owned by primary package `primary`.
    pub fn new(scope: &str, primary: &EntryPoint, secondary: &EntryPoint) -> Self {
        let name = secondary.name();
        let es_dir = format!("../{scope}/{}", primary.name());
        Self {
            name: secondary.import_name().to_string(),
            typings: format!("../typings/{name}/index.d.ts"),
            main: format!("../bundles/{name}.umd.js"),
            module: format!("{es_dir}/{name}.es5.js"),
            es2015: format!("{es_dir}/{name}.js"),
        }
    }
}

/// Composes the release of the graph's primary package.
///
/// Partially written release trees are left as they are on failure.
///
/// # Errors
///
/// Resource resolution errors ([`Error::AmbiguousResource`],
/// [`Error::MissingResource`]) and filesystem errors.
pub async fn compose_release(settings: &BuildSettings, graph: &PackageGraph) -> Result<PathBuf> {
    let primary = &graph[graph.root()];
    let release = primary.release_path();
    let umd_dir = release.join("bundles");
    let es_dir = release.join(settings.scope());

    log::info!("Composing release of {} in {}", primary.import_name(), release.display());
    create_dir_all(release, true).await?;

    inline_package_metadata(primary.output_path()).await?;

    copy_bundles(primary, &umd_dir, &es_dir).await?;
    for &id in primary.secondaries() {
        let secondary = &graph[id];
        copy_bundles(secondary, &umd_dir, &es_dir.join(primary.name())).await?;
    }

    copy_files(primary.output_path(), "**/*.d.ts", &release.join("typings")).await?;
    copy_files(primary.output_path(), "**/*.metadata.json", &release.join("typings")).await?;
    copy_if_exists(&settings.project_root().join("LICENSE"), &release.join("LICENSE")).await?;
    copy_if_exists(&settings.source_root().join("README.md"), &release.join("README.md")).await?;
    copy_if_exists(
        &primary.source_path().join("package.json"),
        &release.join("package.json"),
    )
    .await?;

    rename_files(release, "**/*-flat.d.ts", "index.d.ts").await?;
    rename_files(release, "**/*-flat.metadata.json", "index.metadata.json").await?;

    update_package_version(&release.join("package.json"), settings.version()).await?;
    write_file(
        &release.join(format!("{}.d.ts", primary.name())),
        &format!("{}\nexport * from \"./typings/index\";", settings.license_banner()),
    )
    .await?;
    write_file(
        &release.join(format!("{}.metadata.json", primary.name())),
        r#"{"__symbolic":"module","version":3,"metadata":{},"exports":[{"from":"./typings/index"}]}"#,
    )
    .await?;

    for &id in primary.secondaries() {
        let secondary = &graph[id];
        let descriptor = SecondaryPackageJson::new(settings.scope(), primary, secondary);
        let path = release.join(secondary.name()).join("package.json");
        write_file(&path, &serde_json::to_string_pretty(&descriptor)?).await?;
    }

    log::info!("Release of {} ready", primary.import_name());
    Ok(release.to_path_buf())
}

/// Copies an entry point's UMD bundles into `umd_dir` and its ES module
/// bundles into `es_dir`, each with its sourcemap.
async fn copy_bundles(entry: &EntryPoint, umd_dir: &Path, es_dir: &Path) -> Result<()> {
    let artifacts = BundleArtifacts::in_dir(entry.bundles_path(), entry.name());
    let targets = artifacts
        .umd_bundles()
        .into_iter()
        .map(|file| (file, umd_dir))
        .chain(artifacts.es_modules().into_iter().map(|file| (file, es_dir)));

    for (file, dir) in targets {
        for source in [file.to_path_buf(), map_path(file)] {
            let Some(name) = source.file_name() else {
                continue;
            };
            copy_if_exists(&source, &dir.join(name)).await?;
        }
    }
    Ok(())
}

async fn copy_if_exists(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::try_exists(from)
        .await
        .fs_context("checking release input", from)?
    {
        copy_file(from, to).await
    } else {
        log::debug!("{} does not exist, not copied", from.display());
        Ok(())
    }
}

/// Replaces the version placeholder of a `package.json`, keeping key order.
pub async fn update_package_version(path: &Path, version: &str) -> Result<()> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("No package.json at {}, version not updated", path.display());
            return Ok(());
        }
        Err(e) => return Err(e).fs_context("reading package.json", path),
    };

    let mut package: Value = serde_json::from_str(&json)?;
    let Some(current) = package.get("version").and_then(Value::as_str) else {
        return Err(Error::GenericError(format!(
            "{} has no version field",
            path.display()
        )));
    };
    let updated = current.replace(VERSION_PLACEHOLDER, version);
    package["version"] = Value::String(updated);

    write_file(path, &serde_json::to_string_pretty(&package)?).await
}

async fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .fs_context("creating directory", parent)?;
    }
    tokio::fs::write(path, content)
        .await
        .fs_context("writing release file", path)
}
