//! Entry point discovery and dependency resolution.
//!
//! - [`resolver`] - scans a directory for sub-packages and orders them
//! - [`node`] - the [`PackageGraph`] arena of [`EntryPoint`]s

pub mod node;
pub mod resolver;

pub use node::{EntryPoint, PackageGraph, PackageId};
pub use resolver::{
    DependencyDeclaration, ResolvedPackages, WILDCARD, discover_packages, read_declaration,
    resolve_order, resolve_packages,
};
