//! Configuration structures for package builds.
//!
//! This module provides the [`BuildSettings`] consumed by the orchestrator,
//! the release composer and the toolchain, together with a builder that
//! derives the conventional project layout.

mod builder;
mod core;
mod globals;

pub use builder::BuildSettingsBuilder;
pub use core::BuildSettings;
pub use globals::default_globals;
