//! The external tools behind each build step.
//!
//! [`Toolchain`] is the seam between the orchestrator and the compiler,
//! bundler, transpiler and minifier. [`ProcessToolchain`] drives the usual
//! Node.js command line tools.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::bundler::builder::tool_detection::find_tool;
use crate::bundler::error::{Error, ErrorExt, Result};
use crate::bundler::sourcemap::{SourceMap, chain::rebase_sources};

/// Module format of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleFormat {
    /// Flat ES module
    Es,
    /// Universal Module Definition
    Umd,
}

impl BundleFormat {
    /// Name understood by the bundler.
    pub fn as_str(self) -> &'static str {
        match self {
            BundleFormat::Es => "es",
            BundleFormat::Umd => "umd",
        }
    }
}

/// Input of one bundler run.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// Entry module
    pub entry: PathBuf,
    /// Bundle to write; its map is written next to it
    pub dest: PathBuf,
    /// Output format
    pub format: BundleFormat,
    /// External module id → global variable name; every key stays external
    pub globals: BTreeMap<String, String>,
    /// Global name of the UMD export
    pub module_name: String,
    /// Header prepended to the bundle
    pub banner: String,
}

impl BundleRequest {
    /// Command line arguments for `rollup`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.entry.display().to_string(),
            "--file".into(),
            self.dest.display().to_string(),
            "--format".into(),
            self.format.as_str().into(),
            "--name".into(),
            self.module_name.clone(),
            "--sourcemap".into(),
            "--banner".into(),
            self.banner.clone(),
        ];
        if !self.globals.is_empty() {
            let externals: Vec<&str> = self.globals.keys().map(String::as_str).collect();
            let globals: Vec<String> = self
                .globals
                .iter()
                .map(|(id, global)| format!("{id}:{global}"))
                .collect();
            args.extend([
                "--external".into(),
                externals.join(","),
                "--globals".into(),
                globals.join(","),
            ]);
        }
        args
    }
}

/// Input of one downlevel run: ES5 syntax, ES2015 modules, plain JS accepted.
#[derive(Debug, Clone)]
pub struct DownlevelRequest {
    /// ES2015 file
    pub input: PathBuf,
    /// ES5 file to write
    pub dest: PathBuf,
}

/// Input of one minifier run, keeping license comments.
#[derive(Debug, Clone)]
pub struct MinifyRequest {
    /// File to minify
    pub input: PathBuf,
    /// Minified file to write
    pub dest: PathBuf,
}

/// The external build tools.
///
/// Every operation writes its output file plus an adjacent `.map`.
pub trait Toolchain: Send + Sync + 'static {
    /// Runs the ahead-of-time compiler on a materialized configuration.
    fn compile(&self, config: &Path, base_path: &Path) -> impl Future<Output = Result<()>> + Send;

    /// Bundles a module graph into one file.
    fn bundle(&self, request: &BundleRequest) -> impl Future<Output = Result<()>> + Send;

    /// Rewrites an ES2015 file to ES5 syntax.
    fn downlevel(&self, request: &DownlevelRequest) -> impl Future<Output = Result<()>> + Send;

    /// Minifies a file.
    fn minify(&self, request: &MinifyRequest) -> impl Future<Output = Result<()>> + Send;
}

/// Explicit tool locations. Unset tools are looked up.
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    pub ngc: Option<PathBuf>,
    pub rollup: Option<PathBuf>,
    pub tsc: Option<PathBuf>,
    pub uglifyjs: Option<PathBuf>,
}

/// [`Toolchain`] running `ngc`, `rollup`, `tsc` and `uglifyjs` as child
/// processes.
///
/// Children are killed when their future is dropped, so racing an operation
/// against cancellation stops the tool.
#[derive(Debug, Clone)]
pub struct ProcessToolchain {
    ngc: PathBuf,
    rollup: PathBuf,
    tsc: PathBuf,
    uglifyjs: PathBuf,
}

impl ProcessToolchain {
    /// Locates every tool in the project's `node_modules/.bin`, then on `PATH`.
    ///
    /// # Errors
    ///
    /// [`Error::ToolNotFound`] naming the first missing tool.
    pub fn locate(project_root: &Path) -> Result<Self> {
        Self::locate_with(project_root, &ToolPaths::default())
    }

    /// Like [`ProcessToolchain::locate`], but tools set in `paths` are used
    /// as given.
    pub fn locate_with(project_root: &Path, paths: &ToolPaths) -> Result<Self> {
        let pick = |name: &str, path: &Option<PathBuf>| match path {
            Some(path) => Ok(path.clone()),
            None => find_tool(name, project_root),
        };
        Ok(Self {
            ngc: pick("ngc", &paths.ngc)?,
            rollup: pick("rollup", &paths.rollup)?,
            tsc: pick("tsc", &paths.tsc)?,
            uglifyjs: pick("uglifyjs", &paths.uglifyjs)?,
        })
    }

    async fn run(&self, tool: &Path, args: &[String], cwd: Option<&Path>) -> Result<()> {
        let name = tool
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| tool.display().to_string());
        log::debug!("Running {} {}", name, args.join(" "));

        let mut command = Command::new(tool);
        command.args(args).kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let output = command.output().await.map_err(|e| Error::CommandFailed {
            command: name.clone(),
            error: e,
        })?;

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                // ngc prints diagnostics on stdout
                stderr = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            return Err(Error::ToolFailed {
                tool: name,
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(())
    }
}

impl Toolchain for ProcessToolchain {
    async fn compile(&self, config: &Path, base_path: &Path) -> Result<()> {
        let args = vec!["-p".to_string(), config.display().to_string()];
        self.run(&self.ngc, &args, Some(base_path)).await
    }

    async fn bundle(&self, request: &BundleRequest) -> Result<()> {
        if let Some(parent) = request.dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .fs_context("creating bundle directory", parent)?;
        }
        self.run(&self.rollup, &request.to_args(), None).await
    }

    /// `tsc` cannot rename its output, so it emits into a scratch directory
    /// next to the destination and the result is moved into place.
    async fn downlevel(&self, request: &DownlevelRequest) -> Result<()> {
        let dest_dir = request.dest.parent().unwrap_or(Path::new("."));
        let dest_name = file_name(&request.dest)?;
        let stem = request
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let scratch = dest_dir.join(format!(".downlevel-{stem}"));

        let args = vec![
            request.input.display().to_string(),
            "--target".into(),
            "ES5".into(),
            "--module".into(),
            "ES2015".into(),
            "--allowJs".into(),
            "--sourceMap".into(),
            "--skipLibCheck".into(),
            "--outDir".into(),
            scratch.display().to_string(),
        ];
        let result = async {
            self.run(&self.tsc, &args, None).await?;

            let emitted = scratch.join(file_name(&request.input)?);
            let code = tokio::fs::read_to_string(&emitted)
                .await
                .fs_context("reading downleveled file", &emitted)?;
            let code = retarget_map_comment(&code, &format!("{dest_name}.map"));
            tokio::fs::write(&request.dest, code)
                .await
                .fs_context("writing downleveled file", &request.dest)?;

            let emitted_map = PathBuf::from(format!("{}.map", emitted.display()));
            let json = tokio::fs::read_to_string(&emitted_map)
                .await
                .fs_context("reading downlevel sourcemap", &emitted_map)?;
            let mut map = SourceMap::from_json(&json)?;
            rebase_sources(&mut map, &scratch, dest_dir);
            map.file = Some(dest_name.clone());
            let dest_map = PathBuf::from(format!("{}.map", request.dest.display()));
            tokio::fs::write(&dest_map, map.to_json()?)
                .await
                .fs_context("writing downlevel sourcemap", &dest_map)
        }
        .await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            log::debug!("Could not remove {}: {}", scratch.display(), e);
        }
        result
    }

    async fn minify(&self, request: &MinifyRequest) -> Result<()> {
        let dest_name = file_name(&request.dest)?;
        let args = vec![
            request.input.display().to_string(),
            "--output".into(),
            request.dest.display().to_string(),
            "--compress".into(),
            "--mangle".into(),
            "--comments".into(),
            "--source-map".into(),
            format!("url='{dest_name}.map'"),
        ];
        self.run(&self.uglifyjs, &args, None).await
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::GenericError(format!("{} has no file name", path.display())))
}

/// Points the trailing `sourceMappingURL` comment at `url`, appending one if
/// the code has none.
fn retarget_map_comment(code: &str, url: &str) -> String {
    let comment = format!("//# sourceMappingURL={url}");
    match code.rfind("//# sourceMappingURL=") {
        Some(start) => {
            let end = code[start..].find('\n').map_or(code.len(), |i| start + i);
            format!("{}{}{}", &code[..start], comment, &code[end..])
        }
        None if code.ends_with('\n') => format!("{code}{comment}\n"),
        None => format!("{code}\n{comment}\n"),
    }
}
