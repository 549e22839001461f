//! Sub-package discovery and dependency ordering.
//!
//! A directory's immediate sub-packages are the child directories containing
//! the entry file. Their build order comes from an optional declaration file
//! mapping a package name (or `*` for every package at this level) to the
//! packages it must be built after.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::bundler::error::{Error, ErrorExt, Result};

/// Key in a dependency declaration that applies to every package at its level.
pub const WILDCARD: &str = "*";

/// Parsed dependency declaration: package name (or `*`) to dependency names.
pub type DependencyDeclaration = BTreeMap<String, Vec<String>>;

/// Sub-packages of one directory in build order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPackages {
    /// Package names; every dependency precedes its dependents.
    pub order: Vec<String>,
    /// Direct dependencies of each package, in build order.
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl ResolvedPackages {
    /// Direct dependencies of `name`.
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.dependencies.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Lists the immediate sub-packages of `dir` in lexicographic order.
///
/// A child directory counts as a sub-package when it contains `entry_file`.
pub async fn discover_packages(dir: &Path, entry_file: &str) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .fs_context("listing package directory", dir)?;

    let mut packages = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .fs_context("listing package directory", dir)?
    {
        let file_type = entry
            .file_type()
            .await
            .fs_context("reading file type", entry.path())?;
        if !file_type.is_dir() {
            continue;
        }
        if !tokio::fs::try_exists(entry.path().join(entry_file))
            .await
            .fs_context("checking entry file", entry.path())?
        {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            packages.push(name.to_string());
        } else {
            log::warn!("Skipping non UTF-8 directory {}", entry.path().display());
        }
    }

    packages.sort();
    Ok(packages)
}

/// Reads the dependency declaration of `dir`. A missing file yields an empty map.
pub async fn read_declaration(dir: &Path, file_name: &str) -> Result<DependencyDeclaration> {
    let path = dir.join(file_name);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No dependency declaration at {}", path.display());
            return Ok(DependencyDeclaration::new());
        }
        Err(e) => return Err(e).fs_context("reading dependency declaration", &path),
    };

    serde_json::from_str(&content).map_err(|e| Error::InvalidDeclaration {
        path,
        reason: e.to_string(),
    })
}

/// Orders `packages` so that every declared dependency precedes its dependents.
///
/// Ties are broken by the position in `packages`, so a sorted discovery list
/// gives a reproducible order.
///
/// # Errors
///
/// - [`Error::UnknownDependency`] if a declared dependency is not in `packages`
/// - [`Error::DependencyCycle`] if the declared edges contain a cycle
pub fn resolve_order(
    dir: &Path,
    packages: &[String],
    declaration: &DependencyDeclaration,
) -> Result<ResolvedPackages> {
    let mut graph: DiGraph<&str, ()> = DiGraph::with_capacity(packages.len(), 0);
    let nodes: BTreeMap<&str, NodeIndex> = packages
        .iter()
        .map(|name| (name.as_str(), graph.add_node(name.as_str())))
        .collect();

    for key in declaration.keys() {
        if key != WILDCARD && !nodes.contains_key(key.as_str()) {
            log::warn!(
                "Dependency declaration in {} names `{}` which is not a package",
                dir.display(),
                key
            );
        }
    }

    let lookup = |package: &str, dependency: &str| -> Result<NodeIndex> {
        nodes
            .get(dependency)
            .copied()
            .ok_or_else(|| Error::UnknownDependency {
                dir: dir.to_path_buf(),
                package: package.to_string(),
                dependency: dependency.to_string(),
            })
    };

    let wildcard = declaration.get(WILDCARD).map(Vec::as_slice).unwrap_or(&[]);
    for name in packages {
        let target = nodes[name.as_str()];

        // Wildcard dependencies apply to everyone except the dependency itself.
        for dep in wildcard.iter().filter(|dep| *dep != name) {
            let source = lookup(WILDCARD, dep)?;
            graph.update_edge(source, target, ());
        }

        for dep in declaration.get(name).into_iter().flatten() {
            let source = lookup(name, dep)?;
            graph.update_edge(source, target, ());
        }
    }

    let order = stable_toposort(&graph).map_err(|(from, to)| Error::DependencyCycle {
        dir: dir.to_path_buf(),
        from: graph[from].to_string(),
        to: graph[to].to_string(),
    })?;

    let position: BTreeMap<NodeIndex, usize> =
        order.iter().enumerate().map(|(i, idx)| (*idx, i)).collect();

    let dependencies = order
        .iter()
        .map(|&idx| {
            let mut deps: Vec<NodeIndex> = graph
                .neighbors_directed(idx, Direction::Incoming)
                .collect();
            deps.sort_by_key(|dep| position[dep]);
            (
                graph[idx].to_string(),
                deps.into_iter().map(|dep| graph[dep].to_string()).collect(),
            )
        })
        .collect();

    Ok(ResolvedPackages {
        order: order.into_iter().map(|idx| graph[idx].to_string()).collect(),
        dependencies,
    })
}

/// Discovers the sub-packages of `dir` and resolves their build order.
pub async fn resolve_packages(
    dir: &Path,
    entry_file: &str,
    declaration_file: &str,
) -> Result<ResolvedPackages> {
    let packages = discover_packages(dir, entry_file).await?;
    let declaration = read_declaration(dir, declaration_file).await?;
    let resolved = resolve_order(dir, &packages, &declaration)?;
    log::debug!(
        "Resolved {} packages in {}: {:?}",
        resolved.order.len(),
        dir.display(),
        resolved.order
    );
    Ok(resolved)
}

/// Kahn's algorithm picking the lowest node index among ready nodes.
///
/// On failure returns a `(dependent, dependency)` pair taken from a cycle.
fn stable_toposort(graph: &DiGraph<&str, ()>) -> std::result::Result<Vec<NodeIndex>, (NodeIndex, NodeIndex)> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count())
        .collect();

    let mut ready: BTreeSet<NodeIndex> = graph
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for next in graph.neighbors_directed(idx, Direction::Outgoing) {
            in_degree[next.index()] -= 1;
            if in_degree[next.index()] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() == graph.node_count() {
        return Ok(order);
    }

    Err(find_cycle_pair(graph))
}

fn find_cycle_pair(graph: &DiGraph<&str, ()>) -> (NodeIndex, NodeIndex) {
    for component in tarjan_scc(graph) {
        let members: BTreeSet<NodeIndex> = component.iter().copied().collect();
        for &dependency in &component {
            for dependent in graph.neighbors_directed(dependency, Direction::Outgoing) {
                if members.contains(&dependent) && (members.len() > 1 || dependent == dependency)
                {
                    return (dependent, dependency);
                }
            }
        }
    }
    unreachable!("toposort failed on an acyclic graph")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn declaration(json: &str) -> DependencyDeclaration {
        serde_json::from_str(json).unwrap()
    }

    fn index_of(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn no_declaration_keeps_discovery_order() {
        let resolved = resolve_order(
            Path::new("lib"),
            &names(&["a", "b", "c"]),
            &DependencyDeclaration::new(),
        )
        .unwrap();
        assert_eq!(resolved.order, names(&["a", "b", "c"]));
        assert!(resolved.dependencies_of("b").is_empty());
    }

    #[test]
    fn declared_dependencies_come_first() {
        let decl = declaration(r#"{"a": ["c"], "b": ["a"]}"#);
        let resolved = resolve_order(Path::new("lib"), &names(&["a", "b", "c"]), &decl).unwrap();
        assert_eq!(resolved.order, names(&["c", "a", "b"]));
        assert_eq!(resolved.dependencies_of("b"), names(&["a"]).as_slice());
    }

    #[test]
    fn wildcard_applies_to_every_other_package() {
        let decl = declaration(r#"{"*": ["core"], "list": ["button"]}"#);
        let packages = names(&["button", "core", "list", "menu"]);
        let resolved = resolve_order(Path::new("lib"), &packages, &decl).unwrap();

        assert_eq!(resolved.order[0], "core");
        assert!(resolved.dependencies_of("core").is_empty());
        assert_eq!(resolved.dependencies_of("list"), names(&["core", "button"]).as_slice());
        for (dep, pkg) in [("core", "button"), ("core", "list"), ("core", "menu"), ("button", "list")] {
            assert!(index_of(&resolved.order, dep) < index_of(&resolved.order, pkg));
        }
    }

    #[test]
    fn order_satisfies_every_edge_in_a_diamond() {
        let decl = declaration(r#"{"top": ["left", "right"], "left": ["base"], "right": ["base"]}"#);
        let packages = names(&["base", "left", "right", "top"]);
        let resolved = resolve_order(Path::new("lib"), &packages, &decl).unwrap();
        for (pkg, deps) in &decl {
            for dep in deps {
                assert!(index_of(&resolved.order, dep) < index_of(&resolved.order, pkg));
            }
        }
        assert_eq!(resolved.order, names(&["base", "left", "right", "top"]));
    }

    #[test]
    fn cycle_is_a_configuration_error() {
        let decl = declaration(r#"{"a": ["b"], "b": ["a"]}"#);
        let err = resolve_order(Path::new("lib"), &names(&["a", "b"]), &decl).unwrap_err();
        match &err {
            Error::DependencyCycle { from, to, .. } => {
                let mut pair = [from.as_str(), to.as_str()];
                pair.sort();
                assert_eq!(pair, ["a", "b"]);
            }
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
        assert!(err.is_configuration_error());
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let decl = declaration(r#"{"a": ["a"]}"#);
        let err = resolve_order(Path::new("lib"), &names(&["a"]), &decl).unwrap_err();
        assert!(matches!(err, Error::DependencyCycle { ref from, ref to, .. } if from == "a" && to == "a"));
    }

    #[test]
    fn wildcard_does_not_self_loop() {
        let decl = declaration(r#"{"*": ["a"]}"#);
        let resolved = resolve_order(Path::new("lib"), &names(&["a", "b"]), &decl).unwrap();
        assert_eq!(resolved.order, names(&["a", "b"]));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let decl = declaration(r#"{"a": ["missing"]}"#);
        let err = resolve_order(Path::new("lib"), &names(&["a"]), &decl).unwrap_err();
        assert!(matches!(err, Error::UnknownDependency { ref dependency, .. } if dependency == "missing"));
    }

    #[tokio::test]
    async fn discovers_directories_with_entry_file() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", "assets"] {
            std::fs::create_dir(tmp.path().join(name)).unwrap();
        }
        std::fs::write(tmp.path().join("zeta/index.ts"), "").unwrap();
        std::fs::write(tmp.path().join("alpha/index.ts"), "").unwrap();
        std::fs::write(tmp.path().join("index.ts"), "").unwrap();

        let found = discover_packages(tmp.path(), "index.ts").await.unwrap();
        assert_eq!(found, names(&["alpha", "zeta"]));

        let resolved = resolve_packages(tmp.path(), "index.ts", "package-config.json")
            .await
            .unwrap();
        assert_eq!(resolved.order, names(&["alpha", "zeta"]));
    }

    #[tokio::test]
    async fn reads_declaration_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("package-config.json"), r#"{"b": ["a"]}"#).unwrap();
        let decl = read_declaration(tmp.path(), "package-config.json").await.unwrap();
        assert_eq!(decl["b"], names(&["a"]));

        std::fs::write(tmp.path().join("package-config.json"), "{ nope").unwrap();
        assert!(read_declaration(tmp.path(), "package-config.json").await.is_err());
    }
}
