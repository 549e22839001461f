//! Shared fixtures: a project tree on disk and an in-process toolchain.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use kodegen_bundler_package::bundler::{
    BuildSettings, BuildSettingsBuilder, Error, Result, Toolchain,
    pipeline::{BundleRequest, DownlevelRequest, MinifyRequest},
    sourcemap::{OriginalPosition, Segment, SourceMap},
};
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const PACKAGE: &str = "material";

/// Create a project with a primary package, the given secondaries and files.
///
/// `files` are relative to the primary package source.
pub fn create_project(secondaries: &[&str], files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let source = root.join("src").join(PACKAGE);

    write(root, "package.json", r#"{"name":"components","version":"2.0.0"}"#);
    write(root, "LICENSE", "MIT License");
    write(root, "src/README.md", "# Components");
    write(
        &source,
        "package.json",
        r#"{"name":"@angular/material","version":"0.0.0-PLACEHOLDER","main":"./bundles/material.umd.js"}"#,
    );
    write(&source, "index.ts", "export * from './public_api';");
    for secondary in secondaries {
        write(&source, &format!("{secondary}/index.ts"), "export {};");
    }
    for (path, content) in files {
        write(&source, path, content);
    }
    dir
}

pub fn write(base: &Path, path: &str, content: &str) {
    let full = base.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, content).unwrap();
}

pub fn settings(root: &Path) -> BuildSettings {
    settings_builder(root).build().unwrap()
}

pub fn settings_builder(root: &Path) -> BuildSettingsBuilder {
    BuildSettingsBuilder::new()
        .project_root(root)
        .package_name(PACKAGE)
        .version("2.0.0")
}

/// A toolchain that fakes every tool with plain file copies.
///
/// The compiler emits a flat module with a sourcemap pointing at the entry
/// source, plus typings and metadata; every later tool copies its input and
/// writes an identity sourcemap pointing at that input.
#[derive(Default)]
pub struct FakeToolchain {
    events: Mutex<Vec<String>>,
    compiles: Mutex<HashMap<String, usize>>,
    bundles: Mutex<Vec<BundleRequest>>,
    failing: HashSet<String>,
    failing_outputs: HashSet<String>,
    cancel_on: Mutex<Option<(String, CancellationToken)>>,
    delay: Duration,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(20),
            ..Default::default()
        }
    }

    /// Makes compilation of `import_name` fail.
    pub fn failing(mut self, import_name: &str) -> Self {
        self.failing.insert(import_name.to_string());
        self
    }

    /// Makes the bundle, downlevel or minify step writing `file_name` fail.
    pub fn failing_output(mut self, file_name: &str) -> Self {
        self.failing_outputs.insert(file_name.to_string());
        self
    }

    /// Cancels `token` as soon as `event` is recorded.
    pub fn cancel_on(&self, event: &str, token: CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((event.to_string(), token));
    }

    /// `compile:<import name>` and `done:<bundle file>` in call order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("no event {event}"))
    }

    pub fn compile_count(&self, import_name: &str) -> usize {
        self.compiles.lock().unwrap().get(import_name).copied().unwrap_or(0)
    }

    pub fn bundle_requests(&self) -> Vec<BundleRequest> {
        self.bundles.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        if let Some((trigger, token)) = &*self.cancel_on.lock().unwrap() {
            if *trigger == event {
                token.cancel();
            }
        }
        self.events.lock().unwrap().push(event);
    }

    async fn produce(&self, tool: &str, input: &Path, dest: &Path) -> Result<()> {
        let name = file_name(dest);
        if self.failing_outputs.contains(&name) {
            return Err(Error::ToolFailed {
                tool: tool.into(),
                status: "exit status: 1".into(),
                stderr: format!("cannot write {name}"),
            });
        }
        transform(input, dest).await?;
        self.record(format!("done:{name}"));
        Ok(())
    }
}

impl Toolchain for FakeToolchain {
    async fn compile(&self, config: &Path, _base_path: &Path) -> Result<()> {
        let config: Value = serde_json::from_str(&tokio::fs::read_to_string(config).await?)?;
        let id = config["angularCompilerOptions"]["flatModuleId"]
            .as_str()
            .unwrap()
            .to_string();
        let flat = config["angularCompilerOptions"]["flatModuleOutFile"]
            .as_str()
            .unwrap()
            .to_string();
        let out_dir = PathBuf::from(config["compilerOptions"]["outDir"].as_str().unwrap());
        let root_dir = PathBuf::from(config["compilerOptions"]["rootDir"].as_str().unwrap());
        let entry = PathBuf::from(config["files"][0].as_str().unwrap());

        self.record(format!("compile:{id}"));
        *self.compiles.lock().unwrap().entry(id.clone()).or_default() += 1;
        tokio::time::sleep(self.delay).await;

        if self.failing.contains(&id) {
            return Err(Error::ToolFailed {
                tool: "ngc".into(),
                status: "exit status: 1".into(),
                stderr: format!("{}: error TS2304: Cannot find name 'Foo'.", entry.display()),
            });
        }

        tokio::fs::create_dir_all(&out_dir).await?;
        let code = "import { InjectionToken } from '@angular/core';\nexport const TOKEN = new InjectionToken('token');\nexport class Component {}\n";
        emit(&out_dir.join(&flat), code, &entry).await?;

        let stem = flat.trim_end_matches(".js");
        tokio::fs::write(out_dir.join(format!("{stem}.d.ts")), "export declare class Component {}").await?;

        // Resources sit next to the sources; the compiler output references them by name.
        let mut templates = Vec::new();
        let mut entries = tokio::fs::read_dir(&root_dir).await?;
        while let Some(file) = entries.next_entry().await? {
            let name = file.file_name().to_string_lossy().into_owned();
            if name.ends_with(".html") || name.ends_with(".css") {
                tokio::fs::copy(file.path(), out_dir.join(&name)).await?;
                if name.ends_with(".html") {
                    templates.push(serde_json::json!({"templateUrl": format!("./{name}")}));
                }
            }
        }
        let metadata = serde_json::json!({
            "__symbolic": "module",
            "version": 3,
            "metadata": {"Component": {"decorators": [{"arguments": templates}]}},
        });
        tokio::fs::write(
            out_dir.join(format!("{stem}.metadata.json")),
            serde_json::to_string(&metadata)?,
        )
        .await?;
        Ok(())
    }

    async fn bundle(&self, request: &BundleRequest) -> Result<()> {
        self.bundles.lock().unwrap().push(request.clone());
        self.produce("rollup", &request.entry, &request.dest).await
    }

    async fn downlevel(&self, request: &DownlevelRequest) -> Result<()> {
        self.produce("tsc", &request.input, &request.dest).await
    }

    async fn minify(&self, request: &MinifyRequest) -> Result<()> {
        self.produce("uglifyjs", &request.input, &request.dest).await
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

/// Copies `input` to `dest` with a line-by-line sourcemap back to `input`.
async fn transform(input: &Path, dest: &Path) -> Result<()> {
    let code = tokio::fs::read_to_string(input).await?;
    let code: String = code
        .lines()
        .filter(|line| !line.starts_with("//# sourceMappingURL="))
        .map(|line| format!("{line}\n"))
        .collect();
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    emit(dest, &code, input).await
}

/// Writes `code` to `dest` plus `<dest>.map` mapping each line to `source`.
async fn emit(dest: &Path, code: &str, source: &Path) -> Result<()> {
    let name = file_name(dest);
    let mut map = SourceMap::new(Some(name.clone()));
    map.sources = vec![source.to_string_lossy().into_owned()];
    let lines: Vec<Vec<Segment>> = (0..code.lines().count() as u32)
        .map(|line| {
            vec![Segment {
                generated_column: 0,
                original: Some(OriginalPosition {
                    source: 0,
                    line,
                    column: 0,
                    name: None,
                }),
            }]
        })
        .collect();
    map.set_mappings(&lines);

    tokio::fs::write(dest, format!("{code}//# sourceMappingURL={name}.map\n")).await?;
    tokio::fs::write(format!("{}.map", dest.display()), map.to_json()?).await?;
    Ok(())
}

/// Globals passed for each bundle destination file name.
pub fn globals_by_dest(requests: &[BundleRequest]) -> BTreeMap<String, BTreeMap<String, String>> {
    requests
        .iter()
        .map(|r| (file_name(&r.dest), r.globals.clone()))
        .collect()
}
