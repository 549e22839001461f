//! Release packager for component libraries.
//!
//! This library builds a primary package and its secondary entry points into:
//! - flat ES2015 bundles (`<name>.js`)
//! - flat ES5 bundles with ES2015 modules (`<name>.es5.js`)
//! - UMD bundles, plain and minified (`<name>.umd.js`, `<name>.umd.min.js`)
//!
//! with sourcemaps collapsed back to the original sources, and composes the
//! versioned release directory. It can be used both as a CLI tool and as a
//! library dependency.

pub mod bundler;
pub mod cli;
pub mod error;
pub mod metadata;

// Re-export commonly used types
pub use error::{BundlerError, CliError, Result};
