//! Package-scoped compiler configuration.
//!
//! Each entry point is compiled with its own configuration file. The typed
//! [`CompilerConfig`] is derived from the entry point, optionally extended with
//! extra `compilerOptions` from a template in the primary source directory,
//! and serialized next to the build output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::bundler::error::{Error, ErrorExt, Result};
use crate::bundler::graph::{EntryPoint, PackageGraph};
use crate::bundler::settings::BuildSettings;

/// `compilerOptions` of a package configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    pub base_url: String,
    pub root_dir: String,
    pub out_dir: String,
    pub target: &'static str,
    pub module: &'static str,
    pub module_resolution: &'static str,
    pub lib: Vec<&'static str>,
    pub declaration: bool,
    pub source_map: bool,
    pub inline_sources: bool,
    pub experimental_decorators: bool,
    pub emit_decorator_metadata: bool,
    pub skip_lib_check: bool,
    pub paths: BTreeMap<String, Vec<String>>,
}

/// `angularCompilerOptions` of a package configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AngularCompilerOptions {
    pub annotate_for_closure_compiler: bool,
    pub strict_metadata_emit: bool,
    pub skip_template_codegen: bool,
    pub flat_module_out_file: String,
    pub flat_module_id: String,
}

/// Compiler configuration of one entry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfig {
    pub compiler_options: CompilerOptions,
    pub files: Vec<String>,
    pub angular_compiler_options: AngularCompilerOptions,
    /// Template options, merged under the typed ones on serialization.
    #[serde(skip)]
    pub extra_options: Map<String, Value>,
}

impl CompilerConfig {
    /// Derives the configuration of `entry`.
    pub fn for_entry_point(
        settings: &BuildSettings,
        graph: &PackageGraph,
        entry: &EntryPoint,
        extra_options: &Map<String, Value>,
    ) -> Self {
        let primary = graph.parent(entry.id()).unwrap_or(&graph[graph.root()]);
        let mut paths = BTreeMap::new();
        paths.insert(
            format!("{}/*", primary.import_name()),
            vec![format!("{}/*", path_string(primary.output_path()))],
        );

        Self {
            compiler_options: CompilerOptions {
                base_url: path_string(entry.source_path()),
                root_dir: path_string(entry.source_path()),
                out_dir: path_string(entry.output_path()),
                target: "es2015",
                module: "es2015",
                module_resolution: "node",
                lib: vec!["es2015", "dom"],
                declaration: true,
                source_map: true,
                inline_sources: true,
                experimental_decorators: true,
                emit_decorator_metadata: true,
                skip_lib_check: true,
                paths,
            },
            files: vec![path_string(&entry.source_path().join(settings.entry_file()))],
            angular_compiler_options: AngularCompilerOptions {
                annotate_for_closure_compiler: true,
                strict_metadata_emit: true,
                skip_template_codegen: true,
                flat_module_out_file: entry.flat_module_file(),
                flat_module_id: entry.import_name().to_string(),
            },
            extra_options: extra_options.clone(),
        }
    }

    /// Checks that every derived setting is usable.
    pub async fn validate(&self) -> Result<()> {
        let package = &self.angular_compiler_options.flat_module_id;
        let missing = |setting: &'static str| Error::MissingCompilerSetting {
            package: package.clone(),
            setting,
        };

        if package.is_empty() {
            return Err(missing("flatModuleId"));
        }
        if self.compiler_options.out_dir.is_empty() {
            return Err(missing("outDir"));
        }
        let Some(entry) = self.files.first() else {
            return Err(missing("files"));
        };
        if !tokio::fs::try_exists(entry)
            .await
            .fs_context("checking entry file", entry)?
        {
            return Err(missing("files"));
        }
        Ok(())
    }

    /// JSON document handed to the compiler.
    pub fn to_value(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(Value::Object(options)) = value.get_mut("compilerOptions") {
            for (key, extra) in &self.extra_options {
                if !options.contains_key(key) {
                    options.insert(key.clone(), extra.clone());
                }
            }
        }
        Ok(value)
    }

    /// Writes the configuration into `dir`, returning the file path.
    pub async fn write(&self, dir: &Path) -> Result<PathBuf> {
        let file_name = format!(
            "tsconfig-{}.json",
            self.angular_compiler_options
                .flat_module_id
                .trim_start_matches('@')
                .replace('/', "-")
        );
        let path = dir.join(file_name);
        let json = serde_json::to_string_pretty(&self.to_value()?)?;
        tokio::fs::create_dir_all(dir)
            .await
            .fs_context("creating compiler config directory", dir)?;
        tokio::fs::write(&path, json)
            .await
            .fs_context("writing compiler config", &path)?;
        Ok(path)
    }
}

/// Reads extra `compilerOptions` from the template, if it exists.
pub async fn load_template_options(path: &Path) -> Result<Map<String, Value>> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No compiler template at {}", path.display());
            return Ok(Map::new());
        }
        Err(e) => return Err(e).fs_context("reading compiler template", path),
    };

    let invalid = |reason: String| Error::InvalidCompilerConfig {
        path: path.to_path_buf(),
        reason,
    };
    let value: Value = serde_json::from_str(&json).map_err(|e| invalid(e.to_string()))?;
    let Value::Object(mut root) = value else {
        return Err(invalid("expected a JSON object".into()));
    };
    match root.remove("compilerOptions") {
        None => Ok(Map::new()),
        Some(Value::Object(options)) => Ok(options),
        Some(_) => Err(invalid("`compilerOptions` must be an object".into())),
    }
}

/// Derives, validates and writes the configuration of every entry point.
///
/// Nothing is written unless every configuration is valid.
pub async fn materialize_all(
    settings: &BuildSettings,
    graph: &PackageGraph,
) -> Result<Vec<PathBuf>> {
    let extra = load_template_options(&settings.compiler_template_path()).await?;

    let mut configs = Vec::with_capacity(graph.len());
    for entry in graph.iter() {
        let config = CompilerConfig::for_entry_point(settings, graph, entry, &extra);
        config.validate().await?;
        configs.push(config);
    }

    let dir = settings.compiler_config_dir();
    let mut paths = Vec::with_capacity(configs.len());
    for config in &configs {
        paths.push(config.write(&dir).await?);
    }
    Ok(paths)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
