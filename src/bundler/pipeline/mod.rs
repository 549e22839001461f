//! The per-package bundle pipeline.
//!
//! After compilation every entry point goes through the same five stages,
//! each consuming the previous stage's output:
//!
//! 1. [`PipelineStage::EsModuleBundle`] - flat ES2015 bundle (`<name>.js`)
//! 2. [`PipelineStage::Downlevel`] - ES5 syntax with ES2015 modules (`<name>.es5.js`)
//! 3. [`PipelineStage::PureAnnotation`] - `/*@__PURE__*/` markers, in place
//! 4. [`PipelineStage::UmdBundle`] - UMD bundle (`<name>.umd.js`)
//! 5. [`PipelineStage::Minify`] - minified UMD bundle (`<name>.umd.min.js`)
//!
//! Every produced file has its sourcemap collapsed back to the original
//! sources before the next stage starts.

pub mod annotate;
pub mod toolchain;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::bundler::error::{Error, ErrorExt, Result};
use crate::bundler::sourcemap::{collapse, shift_map_columns};

pub use annotate::{PURE_MARKER, annotate_pure_calls};
pub use toolchain::{
    BundleFormat, BundleRequest, DownlevelRequest, MinifyRequest, ProcessToolchain, ToolPaths, Toolchain,
};

/// One step of the bundle pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Flat ES2015 module bundle
    EsModuleBundle,
    /// ES5 downleveling
    Downlevel,
    /// Pure-call annotation
    PureAnnotation,
    /// UMD bundle
    UmdBundle,
    /// Minification
    Minify,
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::EsModuleBundle,
        PipelineStage::Downlevel,
        PipelineStage::PureAnnotation,
        PipelineStage::UmdBundle,
        PipelineStage::Minify,
    ];
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::EsModuleBundle => "es-module bundle",
            PipelineStage::Downlevel => "downlevel",
            PipelineStage::PureAnnotation => "pure annotation",
            PipelineStage::UmdBundle => "umd bundle",
            PipelineStage::Minify => "minify",
        };
        f.write_str(name)
    }
}

/// Bundles produced for one entry point. Each file has a `.map` sibling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleArtifacts {
    /// Flat ES2015 bundle
    pub fesm2015: PathBuf,
    /// Flat ES5 bundle with ES2015 modules
    pub fesm5: PathBuf,
    /// UMD bundle
    pub umd: PathBuf,
    /// Minified UMD bundle
    pub umd_min: PathBuf,
}

impl BundleArtifacts {
    /// Artifact paths of entry point `name` bundled into `dir`.
    pub fn in_dir(dir: &Path, name: &str) -> Self {
        Self {
            fesm2015: dir.join(format!("{name}.js")),
            fesm5: dir.join(format!("{name}.es5.js")),
            umd: dir.join(format!("{name}.umd.js")),
            umd_min: dir.join(format!("{name}.umd.min.js")),
        }
    }

    /// The ES module bundles (ES2015 and ES5).
    pub fn es_modules(&self) -> [&Path; 2] {
        [&self.fesm2015, &self.fesm5]
    }

    /// The UMD bundles (plain and minified).
    pub fn umd_bundles(&self) -> [&Path; 2] {
        [&self.umd, &self.umd_min]
    }
}

/// Sourcemap path of a generated file.
pub fn map_path(file: &Path) -> PathBuf {
    PathBuf::from(format!("{}.map", file.display()))
}

/// What one pipeline run works on.
#[derive(Debug, Clone)]
pub struct PipelineRequest<'a> {
    /// Import name, used to report failures
    pub package: &'a str,
    /// Entry point name, the base of every artifact file name
    pub name: &'a str,
    /// Compiled flat module entry
    pub entry_file: &'a Path,
    /// Global name of the UMD export
    pub module_name: &'a str,
    /// Directory receiving the bundles
    pub output_dir: &'a Path,
    /// External module id → global name
    pub globals: &'a BTreeMap<String, String>,
    /// License header of every bundle
    pub banner: &'a str,
}

/// Runs the five stages for one entry point.
///
/// Stages run strictly in order; the first failure aborts the remaining ones
/// and is returned as [`Error::StageFailed`]. Cancellation is checked before
/// every stage and raced against the running tool.
pub async fn run_pipeline<T: Toolchain>(
    toolchain: &T,
    request: &PipelineRequest<'_>,
    cancel: &CancellationToken,
) -> Result<BundleArtifacts> {
    let artifacts = BundleArtifacts::in_dir(request.output_dir, request.name);
    tokio::fs::create_dir_all(request.output_dir)
        .await
        .fs_context("creating bundle directory", request.output_dir)?;

    for stage in PipelineStage::ALL {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        log::debug!("{}: {}", request.package, stage);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = run_stage(toolchain, stage, request, &artifacts) => result,
        };

        result.map_err(|error| match error {
            Error::Cancelled => Error::Cancelled,
            error => Error::StageFailed {
                stage,
                package: request.package.to_string(),
                source: Box::new(error),
            },
        })?;
    }

    Ok(artifacts)
}

async fn run_stage<T: Toolchain>(
    toolchain: &T,
    stage: PipelineStage,
    request: &PipelineRequest<'_>,
    artifacts: &BundleArtifacts,
) -> Result<()> {
    let produced = match stage {
        PipelineStage::EsModuleBundle => {
            toolchain
                .bundle(&BundleRequest {
                    entry: request.entry_file.to_path_buf(),
                    dest: artifacts.fesm2015.clone(),
                    format: BundleFormat::Es,
                    globals: request.globals.clone(),
                    module_name: request.module_name.to_string(),
                    banner: request.banner.to_string(),
                })
                .await?;
            &artifacts.fesm2015
        }
        PipelineStage::Downlevel => {
            toolchain
                .downlevel(&DownlevelRequest {
                    input: artifacts.fesm2015.clone(),
                    dest: artifacts.fesm5.clone(),
                })
                .await?;
            &artifacts.fesm5
        }
        PipelineStage::PureAnnotation => {
            annotate_file(&artifacts.fesm5).await?;
            &artifacts.fesm5
        }
        PipelineStage::UmdBundle => {
            toolchain
                .bundle(&BundleRequest {
                    entry: artifacts.fesm5.clone(),
                    dest: artifacts.umd.clone(),
                    format: BundleFormat::Umd,
                    globals: request.globals.clone(),
                    module_name: request.module_name.to_string(),
                    banner: request.banner.to_string(),
                })
                .await?;
            &artifacts.umd
        }
        PipelineStage::Minify => {
            toolchain
                .minify(&MinifyRequest {
                    input: artifacts.umd.clone(),
                    dest: artifacts.umd_min.clone(),
                })
                .await?;
            &artifacts.umd_min
        }
    };

    collapse(produced).await?;
    Ok(())
}

/// Annotates `file` in place and shifts its sourcemap accordingly.
pub async fn annotate_file(file: &Path) -> Result<usize> {
    let code = tokio::fs::read_to_string(file)
        .await
        .fs_context("reading file to annotate", file)?;
    let (annotated, insertions) = annotate_pure_calls(&code);
    if insertions.is_empty() {
        return Ok(0);
    }

    tokio::fs::write(file, annotated)
        .await
        .fs_context("writing annotated file", file)?;
    shift_map_columns(file, &insertions).await?;
    log::debug!("Annotated {} pure calls in {}", insertions.len(), file.display());
    Ok(insertions.len())
}
