//! Kodegen Bundler Package - release packager for component libraries.
//!
//! This binary builds FESM2015, ES5, UMD and minified UMD bundles for every
//! entry point of a package and composes the publishable release directory.

use kodegen_bundler_package::cli;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Run CLI and get exit code
    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            for suggestion in e.recovery_suggestions() {
                eprintln!("  hint: {}", suggestion);
            }
            1
        }
    };

    process::exit(exit_code);
}
