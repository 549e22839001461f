//! Integration tests for graph builds
//!
//! Drives the orchestrator over real project trees with an in-process toolchain.

mod common;

use std::sync::Arc;

use common::{FakeToolchain, create_project, globals_by_dest, settings, settings_builder};
use kodegen_bundler_package::bundler::{
    Error, PackageBuilder, PackageGraph, PipelineStage, RecordState, pipeline::PURE_MARKER,
    sourcemap::SourceMap,
};
use pretty_assertions::assert_eq;

async fn builder_for(
    project: &std::path::Path,
    toolchain: FakeToolchain,
) -> Arc<PackageBuilder<FakeToolchain>> {
    let settings = settings(project);
    let graph = PackageGraph::discover(&settings).await.unwrap();
    PackageBuilder::new(settings, graph, toolchain)
}

#[tokio::test]
async fn test_primary_without_secondaries_runs_all_stages() {
    let project = create_project(&[], &[]);
    let builder = builder_for(project.path(), FakeToolchain::new()).await;

    let report = builder.build_graph().await.unwrap();
    assert_eq!(report.built, vec!["@angular/material".to_string()]);

    let events = builder.toolchain().events();
    assert_eq!(
        events,
        vec![
            "compile:@angular/material",
            "done:material.js",
            "done:material.es5.js",
            "done:material.umd.js",
            "done:material.umd.min.js",
        ]
    );

    let bundles = builder.settings().bundles_dir();
    let es5 = std::fs::read_to_string(bundles.join("material.es5.js")).unwrap();
    assert!(es5.contains(&format!("{PURE_MARKER}new InjectionToken('token')")));
    assert_eq!(builder.record_state(builder.graph().root()), RecordState::Completed);
}

#[tokio::test]
async fn test_sourcemaps_point_at_original_sources() {
    let project = create_project(&[], &[]);
    let builder = builder_for(project.path(), FakeToolchain::new()).await;
    builder.build_graph().await.unwrap();

    let bundles = builder.settings().bundles_dir();
    for file in ["material.js", "material.es5.js", "material.umd.js", "material.umd.min.js"] {
        let json = std::fs::read_to_string(bundles.join(format!("{file}.map"))).unwrap();
        let map = SourceMap::from_json(&json).unwrap();
        assert_eq!(map.sources, vec!["../../src/material/index.ts".to_string()], "{file}");
        assert_eq!(map.file.as_deref(), Some(file));
    }

    // Collapsing a collapsed map changes nothing.
    let umd = bundles.join("material.umd.js");
    let before = std::fs::read(bundles.join("material.umd.js.map")).unwrap();
    assert!(!kodegen_bundler_package::bundler::sourcemap::collapse(&umd).await.unwrap());
    assert_eq!(before, std::fs::read(bundles.join("material.umd.js.map")).unwrap());
}

#[tokio::test]
async fn test_declared_dependency_orders_secondaries() {
    let project = create_project(&["a", "b"], &[("package-config.json", r#"{"b": ["a"]}"#)]);
    let builder = builder_for(project.path(), FakeToolchain::new()).await;

    let root = builder.graph().root();
    let order: Vec<&str> = builder.graph()[root]
        .secondaries()
        .iter()
        .map(|id| builder.graph()[*id].name())
        .collect();
    assert_eq!(order, vec!["a", "b"]);

    let report = builder.build_graph().await.unwrap();
    assert_eq!(
        report.built,
        vec!["@angular/material/a", "@angular/material/b", "@angular/material"]
    );

    // b starts only after a's last stage finished.
    let toolchain = builder.toolchain();
    assert!(toolchain.position("compile:@angular/material/b") > toolchain.position("done:a.umd.min.js"));
    assert!(toolchain.position("compile:@angular/material") > toolchain.position("done:b.umd.min.js"));
}

#[tokio::test]
async fn test_independent_secondaries_build_concurrently() {
    let project = create_project(&["a", "c"], &[]);
    let builder = builder_for(project.path(), FakeToolchain::new()).await;
    builder.build_graph().await.unwrap();

    let toolchain = builder.toolchain();
    let first_done = toolchain
        .events()
        .iter()
        .position(|e| e.starts_with("done:"))
        .unwrap();
    assert!(toolchain.position("compile:@angular/material/a") < first_done);
    assert!(toolchain.position("compile:@angular/material/c") < first_done);
}

#[tokio::test]
async fn test_shared_dependency_builds_once() {
    let project = create_project(
        &["a", "b", "c"],
        &[("package-config.json", r#"{"b": ["a"], "c": ["a"]}"#)],
    );
    let builder = builder_for(project.path(), FakeToolchain::new()).await;

    builder.build_graph().await.unwrap();
    assert_eq!(builder.toolchain().compile_count("@angular/material/a"), 1);

    // A later request joins the completed record.
    let a = builder.graph().find("@angular/material/a").unwrap().id();
    builder.build_package(a).await.unwrap();
    builder.build_graph().await.unwrap();
    assert_eq!(builder.toolchain().compile_count("@angular/material/a"), 1);
    assert_eq!(builder.toolchain().compile_count("@angular/material"), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_build() {
    let project = create_project(&["a"], &[]);
    let builder = builder_for(project.path(), FakeToolchain::new()).await;
    let a = builder.graph().find("@angular/material/a").unwrap().id();

    assert_eq!(builder.record_state(a), RecordState::NotStarted);
    let (first, second) = tokio::join!(builder.build_package(a), builder.build_package(a));

    let (first, second) = (first.unwrap(), second.unwrap());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(builder.toolchain().compile_count("@angular/material/a"), 1);
    assert_eq!(builder.record_state(a), RecordState::Completed);
}

#[tokio::test]
async fn test_compile_failure_stops_dependents_only() {
    let project = create_project(&["a", "b", "c"], &[("package-config.json", r#"{"b": ["a"]}"#)]);
    let toolchain = FakeToolchain::new().failing("@angular/material/a");
    let builder = builder_for(project.path(), toolchain).await;

    let err = builder.build_graph().await.unwrap_err();
    let Error::BuildFailed { failures } = &err else {
        panic!("expected BuildFailed, got {err:?}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "@angular/material/a");
    assert!(matches!(*failures[0].1, Error::CompilationFailed { .. }));
    assert!(err.to_string().contains("TS2304"));

    let graph = builder.graph();
    let id = |name: &str| graph.find(name).unwrap().id();
    let toolchain = builder.toolchain();
    assert_eq!(toolchain.compile_count("@angular/material/b"), 0);
    assert_eq!(toolchain.compile_count("@angular/material"), 0);
    assert_eq!(toolchain.compile_count("@angular/material/c"), 1);

    assert_eq!(builder.record_state(id("@angular/material/a")), RecordState::Failed);
    assert_eq!(builder.record_state(id("@angular/material/b")), RecordState::Failed);
    assert_eq!(builder.record_state(id("@angular/material/c")), RecordState::Completed);
    assert!(matches!(
        builder.outcome(id("@angular/material/b")),
        Some(Err(e)) if matches!(*e, Error::DependencyFailed { ref dependency, .. } if dependency == "@angular/material/a")
    ));
}

#[tokio::test]
async fn test_stage_failure_names_stage_and_package() {
    let project = create_project(&["a", "b", "c"], &[("package-config.json", r#"{"b": ["a"]}"#)]);
    let toolchain = FakeToolchain::new().failing_output("a.js");
    let builder = builder_for(project.path(), toolchain).await;

    let err = builder.build_graph().await.unwrap_err();
    let Error::BuildFailed { failures } = &err else {
        panic!("expected BuildFailed, got {err:?}");
    };
    assert_eq!(failures.len(), 1);
    let Error::StageFailed { stage, package, source } = &*failures[0].1 else {
        panic!("expected StageFailed, got {:?}", failures[0].1);
    };
    assert_eq!(*stage, PipelineStage::EsModuleBundle);
    assert_eq!(package, "@angular/material/a");
    assert!(matches!(**source, Error::ToolFailed { ref tool, .. } if tool == "rollup"));
    assert!(err.to_string().contains("es-module bundle"));

    let graph = builder.graph();
    let id = |name: &str| graph.find(name).unwrap().id();
    let toolchain = builder.toolchain();
    assert_eq!(toolchain.compile_count("@angular/material/b"), 0);
    assert_eq!(builder.record_state(id("@angular/material/b")), RecordState::Failed);
    assert_eq!(builder.record_state(id("@angular/material/c")), RecordState::Completed);
    assert!(toolchain.events().contains(&"done:c.umd.min.js".to_string()));
}

#[tokio::test]
async fn test_late_stage_failure_propagates_like_compilation() {
    let project = create_project(&["a", "b"], &[("package-config.json", r#"{"b": ["a"]}"#)]);
    let toolchain = FakeToolchain::new().failing_output("a.umd.min.js");
    let builder = builder_for(project.path(), toolchain).await;

    let err = builder.build_graph().await.unwrap_err();
    let Error::BuildFailed { failures } = &err else {
        panic!("expected BuildFailed, got {err:?}");
    };
    assert!(matches!(
        *failures[0].1,
        Error::StageFailed { stage: PipelineStage::Minify, ref package, .. } if package == "@angular/material/a"
    ));
    assert_eq!(builder.toolchain().compile_count("@angular/material/b"), 0);
}

#[tokio::test]
async fn test_build_limit_runs_one_package_at_a_time() {
    let project = create_project(&["a", "b", "c"], &[("package-config.json", r#"{"b": ["a"]}"#)]);
    let settings = settings_builder(project.path())
        .max_concurrent_builds(1)
        .build()
        .unwrap();
    let graph = PackageGraph::discover(&settings).await.unwrap();
    let builder = PackageBuilder::new(settings, graph, FakeToolchain::new());

    let report = builder.build_graph().await.unwrap();
    assert_eq!(report.built.len(), 4);
    assert_eq!(report.built.last().map(String::as_str), Some("@angular/material"));
    let before = |first: &str, second: &str| {
        report.built.iter().position(|p| p == first) < report.built.iter().position(|p| p == second)
    };
    assert!(before("@angular/material/a", "@angular/material/b"));

    // Each package finishes its last stage before the next one compiles.
    let events = builder.toolchain().events();
    let compiles: Vec<(usize, &str)> = events
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.strip_prefix("compile:").map(|id| (i, id)))
        .collect();
    assert_eq!(compiles.len(), 4);
    for pair in compiles.windows(2) {
        let (_, id) = pair[0];
        let name = id.rsplit('/').next().unwrap();
        let finished = builder.toolchain().position(&format!("done:{name}.umd.min.js"));
        assert!(finished < pair[1].0, "{} compiled before {id} finished", pair[1].1);
    }
}

#[tokio::test]
async fn test_cancel_during_build_stops_further_stages() {
    let project = create_project(&["a"], &[]);
    let builder = builder_for(project.path(), FakeToolchain::new()).await;
    builder
        .toolchain()
        .cancel_on("done:a.js", builder.cancel_token());

    let err = builder.build_graph().await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    let toolchain = builder.toolchain();
    let events = toolchain.events();
    assert_eq!(events.last().map(String::as_str), Some("done:a.js"));
    assert!(!events.contains(&"done:a.es5.js".to_string()));
    assert_eq!(toolchain.compile_count("@angular/material"), 0);
    let a = builder.graph().find("@angular/material/a").unwrap().id();
    assert!(matches!(builder.outcome(a), Some(Err(e)) if matches!(*e, Error::Cancelled)));
}

#[tokio::test]
async fn test_independent_failures_are_all_reported() {
    let project = create_project(&["a", "c"], &[]);
    let toolchain = FakeToolchain::new()
        .failing("@angular/material/a")
        .failing("@angular/material/c");
    let builder = builder_for(project.path(), toolchain).await;

    let err = builder.build_graph().await.unwrap_err();
    let Error::BuildFailed { failures } = &err else {
        panic!("expected BuildFailed, got {err:?}");
    };
    let packages: Vec<&str> = failures.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(packages, vec!["@angular/material/a", "@angular/material/c"]);
    assert!(err.to_string().ends_with("(and 1 more failures)"));
}

#[tokio::test]
async fn test_dependency_cycle_fails_before_any_build() {
    let project = create_project(
        &["a", "b"],
        &[("package-config.json", r#"{"a": ["b"], "b": ["a"]}"#)],
    );
    let settings = settings(project.path());
    let err = PackageGraph::discover(&settings).await.unwrap_err();
    assert!(matches!(err, Error::DependencyCycle { .. }));
    assert!(err.is_configuration_error());
}

#[tokio::test]
async fn test_configuration_error_aborts_before_compiling() {
    let project = create_project(&["a"], &[]);
    std::fs::remove_file(project.path().join("src/material/index.ts")).unwrap();
    let builder = builder_for(project.path(), FakeToolchain::new()).await;

    let err = builder.build_graph().await.unwrap_err();
    assert!(matches!(err, Error::MissingCompilerSetting { .. }));
    assert!(builder.toolchain().events().is_empty());
}

#[tokio::test]
async fn test_cancelled_build_runs_nothing() {
    let project = create_project(&["a"], &[]);
    let builder = builder_for(project.path(), FakeToolchain::new()).await;
    builder.cancel_token().cancel();

    let err = builder.build_graph().await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(builder.toolchain().events().is_empty());
}

#[tokio::test]
async fn test_siblings_and_framework_stay_external() {
    let project = create_project(&["a", "b"], &[("package-config.json", r#"{"b": ["a"]}"#)]);
    let builder = builder_for(project.path(), FakeToolchain::new()).await;
    builder.build_graph().await.unwrap();

    let globals = globals_by_dest(&builder.toolchain().bundle_requests());
    let b = &globals["b.umd.js"];
    assert_eq!(b["@angular/core"], "ng.core");
    assert_eq!(b["@angular/material/a"], "ng.material.a");
    assert!(!b.contains_key("@angular/material/b"));

    let primary = &globals["material.js"];
    assert_eq!(primary["@angular/material/b"], "ng.material.b");
    assert!(!primary.contains_key("@angular/material"));
}
