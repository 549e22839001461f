//! Command line interface for the package bundler.
//!
//! This module wires argument parsing, project metadata, the package graph,
//! the build orchestrator and release composition together.

mod args;

pub use args::Args;

use crate::bundler::{
    BuildSettingsBuilder, PackageBuilder, PackageGraph, ProcessToolchain, compose_release,
};
use crate::error::{BundlerError, CliError, Result};
use crate::metadata::load_project_metadata;
use path_absolutize::Absolutize;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute(args).await
}

/// Runs a full build for already parsed arguments.
pub async fn execute(args: Args) -> Result<i32> {
    args.validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;

    let project_root = args.project_root.absolutize()?.into_owned();
    let metadata = load_project_metadata(&project_root.join("package.json")).await?;
    let version = args
        .release_version
        .clone()
        .unwrap_or_else(|| metadata.version.clone());

    let mut builder = BuildSettingsBuilder::new()
        .project_root(&project_root)
        .package_name(&args.package)
        .scope(&args.scope)
        .namespace(&args.namespace)
        .license_banner(metadata.license_banner(&args.package))
        .version(version)
        .max_concurrent_builds(args.jobs);
    if let Some(source) = &args.source {
        builder = builder.package_source(source);
    }
    if let Some(dist) = &args.dist {
        builder = builder.dist_root(dist);
    }
    let settings = builder.build()?;

    let graph = PackageGraph::discover(&settings).await?;
    let toolchain = ProcessToolchain::locate_with(settings.project_root(), &args.tool_paths())?;
    let package_builder = PackageBuilder::new(settings, graph, toolchain);

    let cancel = package_builder.cancel_token();
    let abort = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling build");
            cancel.cancel();
        }
    });

    let result = package_builder.build_graph().await;
    abort.abort();

    let report = match result {
        Ok(report) => report,
        Err(crate::bundler::Error::BuildFailed { failures }) => {
            for (package, error) in &failures {
                eprintln!("✗ {package}: {error}");
            }
            return Err(BundlerError::Cli(CliError::ExecutionFailed {
                command: "build".to_string(),
                reason: format!("{} entry points failed", failures.len()),
            }));
        }
        Err(e) => return Err(e.into()),
    };

    for package in &report.built {
        println!("✓ {package}");
    }

    if args.skip_release {
        log::info!("Skipping release composition");
        return Ok(0);
    }

    let release = compose_release(package_builder.settings(), package_builder.graph()).await?;
    println!("Release: {}", release.display());
    Ok(0)
}
