//! Command line argument parsing and validation.
//!
//! This module provides CLI argument parsing using clap, with validation of
//! the values clap cannot check on its own.

use crate::bundler::ToolPaths;
use clap::Parser;
use std::path::PathBuf;

/// Release packager for component libraries with secondary entry points
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_package",
    version,
    about = "Builds FESM2015, ES5, UMD and minified UMD bundles of a component library and composes its release",
    long_about = "Builds every entry point of a component library (the primary package plus one level of secondary \
entry points) in dependency order, then composes the versioned release directory.

Secondary entry points are the sub-directories of the package source containing an index.ts. An optional \
package-config.json in the package source declares which entry points must be built before which.

Usage:
  kodegen_bundler_package --package material --source src/lib
  kodegen_bundler_package --package cdk --release-version 2.0.0-beta.8 --jobs 4

The compiler, bundler, transpiler and minifier (ngc, rollup, tsc, uglifyjs) are taken from \
node_modules/.bin of the project, or from PATH, unless given with --ngc, --rollup, --tsc or --uglifyjs."
)]
pub struct Args {
    /// Project root containing package.json, LICENSE and the source root
    #[arg(short = 'r', long, value_name = "DIR", default_value = ".")]
    pub project_root: PathBuf,

    /// Name of the primary package (e.g., material)
    #[arg(short = 'p', long, value_name = "NAME")]
    pub package: String,

    /// Source directory of the package [default: <project-root>/src/<package>]
    #[arg(short = 's', long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Output root for packages, bundles and releases [default: <project-root>/dist]
    #[arg(short = 'd', long, value_name = "DIR")]
    pub dist: Option<PathBuf>,

    /// Import scope of the released packages
    #[arg(long, value_name = "SCOPE", default_value = "@angular")]
    pub scope: String,

    /// Global namespace of the UMD bundles
    #[arg(long, value_name = "NAMESPACE", default_value = "ng")]
    pub namespace: String,

    /// Version written into released package.json files [default: version of package.json]
    #[arg(long, value_name = "VERSION", env = "RELEASE_VERSION")]
    pub release_version: Option<String>,

    /// Maximum number of entry points compiled and bundled at once
    #[arg(short = 'j', long, value_name = "N", default_value_t = num_cpus::get())]
    pub jobs: usize,

    /// Only build the bundles, do not compose the release directory
    #[arg(long)]
    pub skip_release: bool,

    /// Path of the ahead-of-time compiler [default: looked up]
    #[arg(long, value_name = "PATH")]
    pub ngc: Option<PathBuf>,

    /// Path of the module bundler [default: looked up]
    #[arg(long, value_name = "PATH")]
    pub rollup: Option<PathBuf>,

    /// Path of the TypeScript compiler used for downleveling [default: looked up]
    #[arg(long, value_name = "PATH")]
    pub tsc: Option<PathBuf>,

    /// Path of the minifier [default: looked up]
    #[arg(long, value_name = "PATH")]
    pub uglifyjs: Option<PathBuf>,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Explicit tool paths, relative ones resolved against the project root.
    pub fn tool_paths(&self) -> ToolPaths {
        let resolve = |path: &Option<PathBuf>| {
            path.as_ref().map(|path| {
                if path.components().count() > 1 && path.is_relative() {
                    self.project_root.join(path)
                } else {
                    path.clone()
                }
            })
        };
        ToolPaths {
            ngc: resolve(&self.ngc),
            rollup: resolve(&self.rollup),
            tsc: resolve(&self.tsc),
            uglifyjs: resolve(&self.uglifyjs),
        }
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.package.is_empty() || self.package.contains(['/', '\\']) {
            return Err(format!(
                "Invalid package name: `{}`. Expected a single directory name",
                self.package
            ));
        }

        if !self.scope.starts_with('@') {
            return Err(format!("Invalid scope: `{}`. Scopes start with @", self.scope));
        }

        if self.jobs == 0 {
            return Err("--jobs must be at least 1".to_string());
        }

        if let Some(version) = &self.release_version {
            semver::Version::parse(version)
                .map_err(|e| format!("Invalid release version `{version}`: {e}"))?;
        }

        Ok(())
    }
}
