//! Package build orchestration.
//!
//! Turns a component library (primary package plus one level of secondary entry
//! points) into flat ES2015, ES5, UMD and minified UMD bundles, then composes
//! the versioned release tree.
//!
//! # Module Organization
//!
//! - [`graph`] - sub-package discovery, dependency ordering, entry point model
//! - [`builder`] - memoized, dependency-ordered graph builds
//! - [`pipeline`] - the five bundle stages and the external toolchain seam
//! - [`sourcemap`] - Source Map v3 model and chain collapsing
//! - [`release`] - release directory composition and resource inlining
//! - [`settings`] - build configuration
//! - [`utils`] - filesystem helpers

pub mod builder;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod release;
pub mod settings;
pub mod sourcemap;
pub mod utils;

pub use builder::{BuildReport, PackageBuilder, RecordState};
pub use error::{Error, Result};
pub use graph::{EntryPoint, PackageGraph, PackageId};
pub use pipeline::{BundleArtifacts, PipelineStage, ProcessToolchain, ToolPaths, Toolchain};
pub use release::compose_release;
pub use settings::{BuildSettings, BuildSettingsBuilder};
