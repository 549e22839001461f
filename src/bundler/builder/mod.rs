//! Build orchestration and coordination.
//!
//! This module provides the [`PackageBuilder`] that drives every entry point
//! of a [`PackageGraph`](crate::bundler::PackageGraph) through compilation and
//! the bundle pipeline.
//!
//! # Overview
//!
//! The builder:
//! 1. Materializes and validates a compiler configuration per entry point
//! 2. Builds secondaries as soon as their dependencies completed
//! 3. Compiles each entry point with the ahead-of-time compiler
//! 4. Runs the bundle pipeline on the compiler output
//! 5. Builds the primary package last
//!
//! # Module Organization
//!
//! - [`compiler_config`] - typed per-package compiler configuration
//! - [`orchestrator`] - [`PackageBuilder`] and its build records
//! - [`tool_detection`] - locating the external tools

pub mod compiler_config;
mod orchestrator;
pub mod tool_detection;

pub use compiler_config::CompilerConfig;
pub use orchestrator::{BuildOutcome, BuildReport, PackageBuilder, RecordState};
