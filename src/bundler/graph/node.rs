//! Entry point graph.
//!
//! Packages live in an arena owned by [`PackageGraph`] and refer to each other
//! through [`PackageId`]. The parent link is only used to derive names and
//! paths; nothing is ever mutated through it.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::resolver::{ResolvedPackages, resolve_packages};
use crate::bundler::error::{Error, ErrorExt, Result};
use crate::bundler::settings::BuildSettings;

/// Stable identity of a package within one [`PackageGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId(usize);

impl PackageId {
    /// Position of the package in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A publicly importable module boundary: the primary package or one of its
/// secondary entry points.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    id: PackageId,
    name: String,
    source_path: PathBuf,
    output_path: PathBuf,
    release_path: PathBuf,
    bundles_path: PathBuf,
    module_name: String,
    import_name: String,
    parent: Option<PackageId>,
    secondaries: Vec<PackageId>,
    dependencies: Vec<PackageId>,
}

impl EntryPoint {
    /// Arena id.
    pub fn id(&self) -> PackageId {
        self.id
    }

    /// Directory name of the package.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source directory.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Compiled ES-module output directory.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Directory of the composed release this package ends up in.
    pub fn release_path(&self) -> &Path {
        &self.release_path
    }

    /// Directory receiving this package's bundles.
    pub fn bundles_path(&self) -> &Path {
        &self.bundles_path
    }

    /// Dotted global name used for the UMD bundle, e.g. `ng.material.buttonToggle`.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Public import path, e.g. `@angular/material/button-toggle`.
    pub fn import_name(&self) -> &str {
        &self.import_name
    }

    /// Owning primary package, if this is a secondary entry point.
    pub fn parent(&self) -> Option<PackageId> {
        self.parent
    }

    /// Whether this is a primary package.
    pub fn is_primary(&self) -> bool {
        self.parent.is_none()
    }

    /// Secondary entry points in build order.
    pub fn secondaries(&self) -> &[PackageId] {
        &self.secondaries
    }

    /// Packages whose build must complete before this one starts.
    pub fn dependencies(&self) -> &[PackageId] {
        &self.dependencies
    }

    /// Flat module entry emitted by the compiler.
    pub fn flat_module_file(&self) -> String {
        format!("{}-flat.js", self.name)
    }

    /// Full path of the flat module entry emitted by the compiler.
    pub fn compiled_entry(&self) -> PathBuf {
        self.output_path.join(self.flat_module_file())
    }
}

/// The entry point graph of one primary package.
#[derive(Debug, Clone)]
pub struct PackageGraph {
    nodes: Vec<EntryPoint>,
}

impl PackageGraph {
    /// Creates a graph holding only the primary package described by `settings`.
    pub fn new(settings: &BuildSettings) -> Self {
        let name = settings.package_name().to_string();
        let primary = EntryPoint {
            id: PackageId(0),
            output_path: settings.packages_dir().join(&name),
            release_path: settings.releases_dir().join(&name),
            bundles_path: settings.bundles_dir(),
            module_name: format!("{}.{}", settings.namespace(), camel_case(&name)),
            import_name: format!("{}/{}", settings.scope(), name),
            source_path: settings.package_source().to_path_buf(),
            parent: None,
            secondaries: Vec::new(),
            dependencies: Vec::new(),
            name,
        };
        Self {
            nodes: vec![primary],
        }
    }

    /// Scans the primary package's source directory and builds the full graph.
    ///
    /// Secondaries are discovered one level deep only; directories nested
    /// inside a secondary are plain source directories.
    pub async fn discover(settings: &BuildSettings) -> Result<Self> {
        let source = settings.package_source();
        if !tokio::fs::try_exists(source)
            .await
            .fs_context("checking package source", source)?
        {
            return Err(Error::Fs {
                context: "package source does not exist",
                path: source.to_path_buf(),
                error: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        let resolved =
            resolve_packages(source, settings.entry_file(), settings.dependency_file()).await?;

        let mut graph = Self::new(settings);
        let root = graph.root();
        graph.attach_secondaries(root, &resolved)?;

        log::info!(
            "Discovered {} with {} secondary entry points",
            graph[root].import_name,
            graph[root].secondaries.len()
        );
        Ok(graph)
    }

    /// Adds the resolved sub-packages as secondaries of `parent`, wiring their
    /// sibling dependencies.
    ///
    /// A dependency must come earlier in `resolved.order` than its dependent,
    /// which keeps the graph acyclic.
    ///
    /// # Errors
    ///
    /// - [`Error::DependencyCycle`] for a dependency that does not precede its
    ///   dependent, including a self-dependency
    /// - [`Error::UnknownDependency`] for a dependency missing from the order
    pub fn attach_secondaries(&mut self, parent: PackageId, resolved: &ResolvedPackages) -> Result<()> {
        let dir = self.nodes[parent.0].source_path.clone();
        let positions: HashMap<&str, usize> = resolved
            .order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        for (position, name) in resolved.order.iter().enumerate() {
            for dep in resolved.dependencies_of(name) {
                match positions.get(dep.as_str()) {
                    Some(&at) if at < position => {}
                    Some(_) => {
                        return Err(Error::DependencyCycle {
                            dir,
                            from: name.clone(),
                            to: dep.clone(),
                        });
                    }
                    None => {
                        return Err(Error::UnknownDependency {
                            dir,
                            package: name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }

        let mut ids = HashMap::new();
        for name in &resolved.order {
            let id = self.add_secondary(parent, name)?;
            ids.insert(name.as_str(), id);
        }
        for name in &resolved.order {
            let deps = resolved
                .dependencies_of(name)
                .iter()
                .map(|dep| ids[dep.as_str()])
                .collect();
            self.nodes[ids[name.as_str()].0].dependencies = deps;
        }
        Ok(())
    }

    /// Creates a secondary entry point under `parent`.
    ///
    /// # Errors
    ///
    /// [`Error::NestedEntryPoint`] if `parent` is itself a secondary, and
    /// [`Error::GenericError`] if a sibling with the same name exists.
    pub fn add_secondary(&mut self, parent: PackageId, name: &str) -> Result<PackageId> {
        let owner = &self.nodes[parent.0];
        if !owner.is_primary() {
            return Err(Error::NestedEntryPoint(format!("{}/{}", owner.import_name, name)));
        }
        if owner
            .secondaries
            .iter()
            .any(|id| self.nodes[id.0].name == name)
        {
            crate::bail!("duplicate entry point `{}` in {}", name, owner.import_name);
        }

        let id = PackageId(self.nodes.len());
        let secondary = EntryPoint {
            id,
            name: name.to_string(),
            source_path: owner.source_path.join(name),
            output_path: owner.output_path.join(name),
            release_path: owner.release_path.clone(),
            bundles_path: owner.bundles_path.join(&owner.name),
            module_name: format!("{}.{}", owner.module_name, camel_case(name)),
            import_name: format!("{}/{}", owner.import_name, name),
            parent: Some(parent),
            secondaries: Vec::new(),
            dependencies: Vec::new(),
        };

        self.nodes.push(secondary);
        let owner = &mut self.nodes[parent.0];
        owner.secondaries.push(id);
        // A primary is always built after all of its secondaries.
        owner.dependencies.push(id);
        Ok(id)
    }

    /// The primary package.
    pub fn root(&self) -> PackageId {
        PackageId(0)
    }

    /// Looks up a package.
    pub fn get(&self, id: PackageId) -> Option<&EntryPoint> {
        self.nodes.get(id.0)
    }

    /// Finds a package by import name.
    pub fn find(&self, import_name: &str) -> Option<&EntryPoint> {
        self.nodes.iter().find(|node| node.import_name == import_name)
    }

    /// Parent of `id`, if it is a secondary.
    pub fn parent(&self, id: PackageId) -> Option<&EntryPoint> {
        self.nodes[id.0].parent.map(|p| &self.nodes[p.0])
    }

    /// Iterates over every package, primary first.
    pub fn iter(&self) -> impl Iterator<Item = &EntryPoint> {
        self.nodes.iter()
    }

    /// Number of packages including the primary.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a graph holds at least the primary package.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// External module id → global name entries for every entry point of the
    /// graph, so siblings are referenced instead of inlined.
    pub fn entry_point_globals(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodes
            .iter()
            .map(|node| (node.import_name.as_str(), node.module_name.as_str()))
    }
}

impl std::ops::Index<PackageId> for PackageGraph {
    type Output = EntryPoint;

    fn index(&self, id: PackageId) -> &EntryPoint {
        &self.nodes[id.0]
    }
}

/// `button-toggle` → `buttonToggle`.
fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '-' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}
