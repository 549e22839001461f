//! Memoized, dependency-ordered package builds.
//!
//! This module provides the [`PackageBuilder`] that builds every entry point
//! of a [`PackageGraph`]: secondaries first, in dependency order, then the
//! primary package.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::compiler_config::materialize_all;
use crate::bundler::{
    BuildSettings, Error, Result,
    graph::{PackageGraph, PackageId},
    pipeline::{BundleArtifacts, PipelineRequest, Toolchain, run_pipeline},
};

/// Final state of one package build, shared by every waiter.
pub type BuildOutcome = std::result::Result<Arc<BundleArtifacts>, Arc<Error>>;

type BuildFuture = Pin<Box<dyn Future<Output = BuildOutcome> + Send + 'static>>;

/// Observable state of a package's build record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Never requested
    NotStarted,
    /// Requested and not yet resolved
    InProgress,
    /// Built successfully
    Completed,
    /// Failed, or skipped because a dependency failed
    Failed,
}

/// Result of a successful graph build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Import names in the order their builds completed.
    pub built: Vec<String>,
}

/// Builds the entry points of one package graph.
///
/// Each package has a single build record. The first request for a package
/// starts its build; every later or concurrent request waits for that same
/// record, so a shared dependency is never built twice.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_package::bundler::{
///     BuildSettingsBuilder, PackageBuilder, PackageGraph, ProcessToolchain,
/// };
///
/// # async fn example() -> kodegen_bundler_package::bundler::Result<()> {
/// let settings = BuildSettingsBuilder::new()
///     .project_root(".")
///     .package_name("material")
///     .version("2.0.0")
///     .build()?;
///
/// let graph = PackageGraph::discover(&settings).await?;
/// let toolchain = ProcessToolchain::locate(settings.project_root())?;
/// let builder = PackageBuilder::new(settings, graph, toolchain);
///
/// let report = builder.build_graph().await?;
/// println!("Built {} entry points", report.built.len());
/// # Ok(())
/// # }
/// ```
pub struct PackageBuilder<T: Toolchain> {
    settings: BuildSettings,
    graph: PackageGraph,
    toolchain: T,
    records: Mutex<HashMap<PackageId, Arc<OnceCell<BuildOutcome>>>>,
    configs: OnceCell<Vec<PathBuf>>,
    limiter: Option<Semaphore>,
    cancel: CancellationToken,
    completed: Mutex<Vec<String>>,
}

impl<T: Toolchain> std::fmt::Debug for PackageBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageBuilder")
            .field("settings", &self.settings)
            .field("graph", &self.graph)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl<T: Toolchain> PackageBuilder<T> {
    /// Creates a builder for `graph`.
    ///
    /// A `max_concurrent_builds` setting bounds how many packages compile and
    /// bundle at once; it only delays ready packages and never reorders them
    /// relative to their dependencies.
    pub fn new(settings: BuildSettings, graph: PackageGraph, toolchain: T) -> Arc<Self> {
        let limiter = settings.max_concurrent_builds().map(Semaphore::new);
        Arc::new(Self {
            settings,
            graph,
            toolchain,
            records: Mutex::new(HashMap::new()),
            configs: OnceCell::new(),
            limiter,
            cancel: CancellationToken::new(),
            completed: Mutex::new(Vec::new()),
        })
    }

    /// The graph being built.
    pub fn graph(&self) -> &PackageGraph {
        &self.graph
    }

    /// The build settings.
    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// The toolchain running the build steps.
    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    /// Token aborting the whole build when cancelled.
    ///
    /// Outstanding tool invocations are dropped and no further stage starts.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current state of `id`'s build record.
    pub fn record_state(&self, id: PackageId) -> RecordState {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        match records.get(&id).map(|cell| cell.get()) {
            None => RecordState::NotStarted,
            Some(None) => RecordState::InProgress,
            Some(Some(Ok(_))) => RecordState::Completed,
            Some(Some(Err(_))) => RecordState::Failed,
        }
    }

    /// Outcome of `id`'s build, once resolved.
    pub fn outcome(&self, id: PackageId) -> Option<BuildOutcome> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(&id).and_then(|cell| cell.get().cloned())
    }

    /// Builds the whole graph: every secondary in dependency order, then the
    /// primary package.
    ///
    /// Compiler configurations of all packages are materialized first; a
    /// configuration error aborts before any package is compiled.
    ///
    /// # Errors
    ///
    /// - the configuration error, if any
    /// - [`Error::Cancelled`] if the build was aborted
    /// - [`Error::BuildFailed`] holding the root cause of every failed
    ///   package; packages skipped because a dependency failed are not listed
    pub async fn build_graph(self: &Arc<Self>) -> Result<BuildReport> {
        self.prepare().await?;

        let root = self.graph.root();
        log::info!("Building {}", self.graph[root].import_name());
        let outcome = self.build_package(root).await;

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let failures: Vec<(String, Arc<Error>)> = self
            .graph
            .iter()
            .filter_map(|entry| match self.outcome(entry.id()) {
                Some(Err(error)) if !matches!(*error, Error::DependencyFailed { .. }) => {
                    Some((entry.import_name().to_string(), error))
                }
                _ => None,
            })
            .collect();

        if !failures.is_empty() {
            return Err(Error::BuildFailed { failures });
        }
        if let Err(error) = outcome {
            // Only reachable if the root record failed on a propagated error.
            return Err(Error::BuildFailed {
                failures: vec![(self.graph[root].import_name().to_string(), error)],
            });
        }

        let built = self
            .completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        log::info!("Built {} entry points", built.len());
        Ok(BuildReport { built })
    }

    /// Builds `id` after its dependencies, or joins the build already under
    /// way for it.
    pub fn build_package(self: &Arc<Self>, id: PackageId) -> BuildFuture {
        let this = Arc::clone(self);
        Box::pin(async move {
            let cell = this.record(id);
            cell.get_or_init(|| this.execute(id)).await.clone()
        })
    }

    fn record(&self, id: PackageId) -> Arc<OnceCell<BuildOutcome>> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(records.entry(id).or_default())
    }

    async fn prepare(&self) -> Result<&[PathBuf]> {
        let configs = self
            .configs
            .get_or_try_init(|| materialize_all(&self.settings, &self.graph))
            .await?;
        Ok(configs)
    }

    async fn execute(self: &Arc<Self>, id: PackageId) -> BuildOutcome {
        let entry = &self.graph[id];
        let package = entry.import_name().to_string();

        let mut deps = JoinSet::new();
        for &dep in entry.dependencies() {
            let build = self.build_package(dep);
            deps.spawn(async move { (dep, build.await) });
        }

        let mut failed: Option<PackageId> = None;
        let mut cancelled = false;
        while let Some(joined) = deps.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((_, Err(error))) if matches!(*error, Error::Cancelled) => cancelled = true,
                Ok((dep, Err(_))) => {
                    let position = |id: PackageId| entry.dependencies().iter().position(|d| *d == id);
                    if failed.is_none_or(|current| position(dep) < position(current)) {
                        failed = Some(dep);
                    }
                }
                Err(join_error) => {
                    return Err(Arc::new(Error::GenericError(format!(
                        "build task of a dependency of `{package}` panicked: {join_error}"
                    ))));
                }
            }
        }

        if cancelled {
            return Err(Arc::new(Error::Cancelled));
        }
        if let Some(dep) = failed {
            let dependency = self.graph[dep].import_name().to_string();
            log::warn!("Skipping {package}: dependency {dependency} failed");
            return Err(Arc::new(Error::DependencyFailed { package, dependency }));
        }

        self.run(id).await.map(Arc::new).map_err(Arc::new)
    }

    async fn run(&self, id: PackageId) -> Result<BundleArtifacts> {
        let configs = self.prepare().await?;
        let config = &configs[id.index()];
        let entry = &self.graph[id];

        let _permit = match &self.limiter {
            Some(limiter) => Some(limiter.acquire().await.map_err(|_| Error::Cancelled)?),
            None => None,
        };
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        log::info!("Compiling {}", entry.import_name());
        let compiled = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = self.toolchain.compile(config, entry.source_path()) => result,
        };
        compiled.map_err(|error| match error {
            Error::Cancelled => Error::Cancelled,
            error => Error::CompilationFailed {
                package: entry.import_name().to_string(),
                message: error.to_string(),
            },
        })?;

        let globals = self.globals_for(id);
        let entry_file = entry.compiled_entry();
        let request = PipelineRequest {
            package: entry.import_name(),
            name: entry.name(),
            entry_file: &entry_file,
            module_name: entry.module_name(),
            output_dir: entry.bundles_path(),
            globals: &globals,
            banner: self.settings.license_banner(),
        };
        let artifacts = run_pipeline(&self.toolchain, &request, &self.cancel).await?;

        log::info!("Built {}", entry.import_name());
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.import_name().to_string());
        Ok(artifacts)
    }

    /// External module id → global name map for bundling `id`: the configured
    /// globals plus every other entry point of the graph, so siblings are
    /// referenced rather than inlined.
    pub fn globals_for(&self, id: PackageId) -> BTreeMap<String, String> {
        let own = self.graph[id].import_name();
        let mut globals = self.settings.globals().clone();
        for (import_name, module_name) in self.graph.entry_point_globals() {
            if import_name != own {
                globals.insert(import_name.to_string(), module_name.to_string());
            }
        }
        globals
    }
}
