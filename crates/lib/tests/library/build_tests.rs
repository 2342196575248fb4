//! Orchestrator behavior over graphs loaded from disk.

use std::collections::BTreeSet;
use std::sync::Arc;

use polybuild_lib::backend::{BackendError, Registry};
use polybuild_lib::build::{BuildError, BuildOptions, Orchestrator};
use polybuild_lib::graph::{
  Dependency, LoadOptions, Repository, RepositoryMetadata, Target, TargetGraph, TargetKey,
};
use polybuild_lib::spec::{PackageKind, RepositorySpec, TargetKind};
use serde_json::json;

use super::common::*;

fn app_key(name: &str) -> TargetKey {
  TargetKey::new("app", name)
}

mod traversal {
  use super::*;

  #[test]
  fn diamond_dependency_is_built_once() {
    let ws = Workspace::new();
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "app":   {"kind": "command", "deps": ["left", "right"]},
        "left":  {"kind": "command", "deps": ["base"]},
        "right": {"kind": "command", "deps": ["base"]},
        "base":  {"kind": "command"}
      }}),
    );
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();

    let (registry, calls) = recording_registry();
    let mut run = Orchestrator::new(&graph, registry, ws.config(), BuildOptions::default());
    let output = run.build(&app_key("app")).unwrap();

    assert_eq!(names(&calls).iter().filter(|n| *n == "base").count(), 1);
    assert_eq!(output.results.len(), 4);

    let left = &output.results[&app_key("left")];
    let right = &output.results[&app_key("right")];
    assert!(Arc::ptr_eq(&left.dependencies["base"], &right.dependencies["base"]));
  }

  #[test]
  fn environment_is_created_once_per_kind() {
    let ws = Workspace::new();
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "app": {"kind": "command", "deps": ["a", "b"]},
        "a":   {"kind": "command"},
        "b":   {"kind": "command", "deps": ["a"]}
      }}),
    );
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();

    let (backend, calls) = RecordingBackend::new(TargetKind::Command);
    let envs = backend.envs.clone();
    let mut run = Orchestrator::new(&graph, Registry::empty().with(backend), ws.config(), BuildOptions::default());
    run.build_all(&[app_key("app"), app_key("b")]).unwrap();

    assert_eq!(calls.borrow().len(), 3);
    assert_eq!(envs.get(), 1);
  }

  #[test]
  fn chain_is_built_leaves_first() {
    let ws = Workspace::new();
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "a": {"kind": "command", "deps": ["b"]},
        "b": {"kind": "command", "deps": ["c"]},
        "c": {"kind": "command"}
      }}),
    );
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();

    let (registry, calls) = recording_registry();
    let output = Orchestrator::new(&graph, registry, ws.config(), BuildOptions::default())
      .build(&app_key("a"))
      .unwrap();

    assert_eq!(names(&calls), ["c", "b", "a"]);
    let built: BTreeSet<_> = output.results.keys().map(|k| k.name.as_str()).collect();
    assert_eq!(built, BTreeSet::from(["a", "b", "c"]));

    // Each target saw its dependency's result.
    assert_eq!(calls.borrow()[1].deps, vec!["c".to_string()]);
    assert_eq!(calls.borrow()[2].deps, vec!["b".to_string()]);
  }

  #[test]
  fn non_building_edge_is_never_built() {
    let ws = Workspace::new();
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "a": {"kind": "command", "deps": [{"target": "b", "build": false}]},
        "b": {"kind": "command"}
      }}),
    );
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default().with_targets(["a"])).unwrap();
    assert!(graph.target(&app_key("b")).is_some());

    let (registry, calls) = recording_registry();
    let mut run = Orchestrator::new(&graph, registry, ws.config(), BuildOptions::default());
    run.build(&app_key("a")).unwrap();

    assert_eq!(names(&calls), ["a"]);
    assert!(run.result(&app_key("b")).is_none());
  }

  #[test]
  fn aggregate_target_builds_dependencies_only() {
    let ws = Workspace::new();
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "all": {"deps": ["x", "y"]},
        "x": {"kind": "command"},
        "y": {"kind": "command"}
      }}),
    );
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();

    let (registry, calls) = recording_registry();
    let output = Orchestrator::new(&graph, registry, ws.config(), BuildOptions::default())
      .build(&app_key("all"))
      .unwrap();

    assert_eq!(names(&calls), ["x", "y"]);
    let root = output.root.unwrap();
    assert!(root.builder.is_none());
    assert!(root.artifacts.is_empty());
    assert_eq!(root.dependencies.len(), 2);
  }

  #[test]
  fn build_all_shares_results_between_roots() {
    let ws = Workspace::new();
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "server": {"kind": "command", "deps": ["proto"]},
        "client": {"kind": "command", "deps": ["proto"]},
        "proto":  {"kind": "command"}
      }}),
    );
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();

    let (registry, calls) = recording_registry();
    let mut run = Orchestrator::new(&graph, registry, ws.config(), BuildOptions::default());
    let outputs = run.build_all(&[app_key("server"), app_key("client")]).unwrap();

    assert_eq!(names(&calls), ["proto", "server", "client"]);
    assert_eq!(outputs.len(), 2);
    assert!(outputs.iter().all(|o| o.tag == run.tag()));
  }
}

mod options {
  use super::*;

  fn chain(ws: &Workspace) -> TargetGraph {
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "a": {"kind": "command", "deps": ["b"]},
        "b": {"kind": "command", "deps": ["c"]},
        "c": {"kind": "command"}
      }}),
    );
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();
    graph
  }

  #[test]
  fn no_dependencies_builds_only_root() {
    let ws = Workspace::new();
    let graph = chain(&ws);
    let (registry, calls) = recording_registry();
    let options = BuildOptions {
      build_dependencies: false,
      ..Default::default()
    };

    Orchestrator::new(&graph, registry, ws.config(), options)
      .build(&app_key("a"))
      .unwrap();
    assert_eq!(names(&calls), ["a"]);
  }

  #[test]
  fn skip_root_builds_only_dependencies() {
    let ws = Workspace::new();
    let graph = chain(&ws);
    let (registry, calls) = recording_registry();
    let options = BuildOptions {
      skip_root: true,
      ..Default::default()
    };

    let output = Orchestrator::new(&graph, registry, ws.config(), options)
      .build(&app_key("a"))
      .unwrap();
    assert_eq!(names(&calls), ["c", "b"]);
    assert!(output.root.is_none());
  }

  #[test]
  fn output_dir_receives_root_artifacts() {
    let ws = Workspace::new();
    let graph = chain(&ws);
    let (registry, _) = recording_registry();
    let out = ws.path().join("dist");
    let options = BuildOptions {
      output_dir: Some(out.clone()),
      ..Default::default()
    };

    let output = Orchestrator::new(&graph, registry, ws.config(), options)
      .build(&app_key("a"))
      .unwrap();

    assert_eq!(output.outputs, vec![out.join("a/out")]);
    assert_eq!(std::fs::read_to_string(out.join("a/out")).unwrap(), "app::a");
  }

  #[test]
  fn run_namespace_is_under_build_root_and_cleanable() {
    let ws = Workspace::new();
    let graph = chain(&ws);
    let (registry, _) = recording_registry();

    let mut run = Orchestrator::new(&graph, registry, ws.config(), BuildOptions::default());
    let output = run.build(&app_key("a")).unwrap();

    let namespace = ws.build_root().join(output.tag.to_string());
    assert_eq!(run.namespace(), namespace);
    let out_path = output.root.unwrap().output_path.clone().unwrap();
    assert!(out_path.starts_with(namespace.join("command")));

    assert!(run.clean().unwrap());
    assert!(!namespace.exists());
  }
}

mod errors {
  use super::*;

  #[test]
  fn build_time_cycle_is_detected() {
    let ws = Workspace::new();
    let mut graph = graph();
    graph
      .insert_repository(Repository::new(
        "app".to_string(),
        ws.path(),
        RepositoryMetadata::default(),
        RepositorySpec::default(),
      ))
      .unwrap();

    let edge = |to: &str| Dependency {
      name: to.to_string(),
      key: app_key(to),
      build: true,
    };
    let mut a = Target::new(app_key("a"), ws.path(), Some(TargetKind::Command));
    a.deps.push(edge("b"));
    let mut b = Target::new(app_key("b"), ws.path(), Some(TargetKind::Command));
    b.deps.push(edge("a"));
    graph.insert(a).unwrap();
    graph.insert(b).unwrap();

    let (registry, calls) = recording_registry();
    let err = Orchestrator::new(&graph, registry, ws.config(), BuildOptions::default())
      .build(&app_key("a"))
      .unwrap_err();

    assert!(err.is_cycle());
    assert!(err.to_string().starts_with("circle building dependency"));
    assert!(calls.borrow().is_empty());
  }

  #[test]
  fn unbuilt_edge_masks_build_time_cycle() {
    let ws = Workspace::new();
    let mut graph = graph();
    graph
      .insert_repository(Repository::new(
        "app".to_string(),
        ws.path(),
        RepositoryMetadata::default(),
        RepositorySpec::default(),
      ))
      .unwrap();

    let edge = |to: &str, build: bool| Dependency {
      name: to.to_string(),
      key: app_key(to),
      build,
    };
    let mut a = Target::new(app_key("a"), ws.path(), Some(TargetKind::Command));
    a.deps.push(edge("b", true));
    let mut b = Target::new(app_key("b"), ws.path(), Some(TargetKind::Command));
    b.deps.push(edge("a", false));
    graph.insert(a).unwrap();
    graph.insert(b).unwrap();

    let (registry, calls) = recording_registry();
    let output = Orchestrator::new(&graph, registry, ws.config(), BuildOptions::default())
      .build(&app_key("a"))
      .unwrap();

    assert_eq!(names(&calls), ["b", "a"]);
    assert_eq!(output.results.len(), 2);
  }

  #[test]
  fn unknown_kind_is_fatal() {
    let ws = Workspace::new();
    let repo = ws.repo("app", json!({"uri": "app", "targets": {"a": {"kind": "container-image"}}}));
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();

    let err = Orchestrator::new(&graph, Registry::empty(), ws.config(), BuildOptions::default())
      .build(&app_key("a"))
      .unwrap_err();
    assert!(matches!(
      err,
      BuildError::UnknownBuildKind {
        kind: TargetKind::ContainerImage,
        ..
      }
    ));
  }

  #[test]
  fn failure_stops_the_run_and_names_the_target() {
    let ws = Workspace::new();
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "app": {"kind": "command", "deps": ["broken"]},
        "broken": {"kind": "compiled-binary"}
      }}),
    );
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();

    let (recording, calls) = RecordingBackend::new(TargetKind::Command);
    let registry = Registry::empty()
      .with(recording)
      .with(FailingBackend(TargetKind::CompiledBinary));
    let mut run = Orchestrator::new(&graph, registry, ws.config(), BuildOptions::default());
    let err = run.build(&app_key("app")).unwrap_err();

    assert_eq!(err.target(), Some(&app_key("broken")));
    assert!(matches!(err, BuildError::Target { source: BackendError::MissingOutput { .. }, .. }));
    assert!(calls.borrow().is_empty());
    assert!(run.results().is_empty());
  }

  #[test]
  fn duplicate_artifact_names_are_rejected() {
    let ws = Workspace::new();
    let repo = ws.repo("app", json!({"uri": "app", "targets": {"a": {"kind": "command"}}}));
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();

    let (mut backend, _) = RecordingBackend::new(TargetKind::Command);
    backend.names = vec!["same", "same"];
    let err = Orchestrator::new(&graph, Registry::empty().with(backend), ws.config(), BuildOptions::default())
      .build(&app_key("a"))
      .unwrap_err();
    assert!(matches!(err, BuildError::Target { source: BackendError::DuplicateArtifact(_), .. }));
  }
}

#[cfg(unix)]
mod packages {
  use super::*;
  use polybuild_lib::build::Installer;

  fn logging_installer(log: &std::path::Path) -> Installer {
    Installer {
      command: vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        format!("echo \"$@\" >> '{}'", log.display()),
        "sh".to_string(),
      ],
      update_args: Vec::new(),
      root_arg: None,
      root_env: None,
    }
  }

  fn setup(ws: &Workspace) -> TargetGraph {
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "app": {"kind": "command", "deps": ["lib"], "packages": {"pip": ["requests"]}},
        "lib": {"kind": "command", "packages": {"pip": ["requests", "attrs"]}}
      }}),
    );
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();
    graph
  }

  #[test]
  fn packages_install_once_per_run() {
    let ws = Workspace::new();
    let graph = setup(&ws);
    let log = ws.path().join("pip.log");
    let mut config = ws.config();
    config.installers.insert(PackageKind::Pip, logging_installer(&log));
    let (registry, _) = recording_registry();

    Orchestrator::new(&graph, registry, config, BuildOptions::default())
      .build(&app_key("app"))
      .unwrap();

    let installed = std::fs::read_to_string(&log).unwrap();
    assert_eq!(installed.lines().collect::<Vec<_>>(), ["requests", "attrs"]);
  }

  #[test]
  fn skipped_package_kind_never_runs_installer() {
    let ws = Workspace::new();
    let graph = setup(&ws);
    let log = ws.path().join("pip.log");
    let mut config = ws.config();
    config.installers.insert(PackageKind::Pip, logging_installer(&log));
    let (registry, calls) = recording_registry();
    let options = BuildOptions {
      skip_packages: [PackageKind::Pip].into(),
      ..Default::default()
    };

    Orchestrator::new(&graph, registry, config, options)
      .build(&app_key("app"))
      .unwrap();

    assert!(!log.exists());
    assert_eq!(names(&calls), ["lib", "app"]);
  }

  #[test]
  fn install_failure_is_fatal_unless_ignored() {
    let ws = Workspace::new();
    let graph = setup(&ws);
    let mut config = ws.config();
    config.installers.insert(
      PackageKind::Pip,
      Installer {
        command: vec!["/bin/sh".to_string(), "-c".to_string(), "exit 1".to_string()],
        update_args: Vec::new(),
        root_arg: None,
        root_env: None,
      },
    );

    let (registry, _) = recording_registry();
    let err = Orchestrator::new(&graph, registry, config.clone(), BuildOptions::default())
      .build(&app_key("app"))
      .unwrap_err();
    assert!(matches!(err, BuildError::DependencyInstall { kind: PackageKind::Pip, .. }));

    let (registry, calls) = recording_registry();
    let options = BuildOptions {
      ignore_install_errors: [PackageKind::Pip].into(),
      ..Default::default()
    };
    Orchestrator::new(&graph, registry, config, options)
      .build(&app_key("app"))
      .unwrap();
    assert_eq!(names(&calls), ["lib", "app"]);
  }
}

#[cfg(unix)]
mod backends {
  use super::*;
  use polybuild_lib::build::Artifact;

  #[test]
  fn command_and_library_end_to_end() {
    let ws = Workspace::new();
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "py:util": {"kind": "interpreted-library", "spec": {"name": "acme_util"}},
        "gen": {
          "kind": "command",
          "deps": ["//py:util"],
          "spec": {"command": "echo generated > \"$PB_OUTPUT_PATH/gen.txt\"", "outputs": ["gen.txt"]}
        }
      }}),
    );
    std::fs::create_dir_all(repo.join("py")).unwrap();
    std::fs::write(repo.join("py/__init__.py"), "").unwrap();

    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();

    let mut run = Orchestrator::new(&graph, Registry::standard(), ws.config(), BuildOptions::default());
    let output = run.build(&app_key("gen")).unwrap();

    let root = output.root.unwrap();
    let gen_file = root.artifact("gen.txt").and_then(Artifact::path).unwrap();
    assert_eq!(std::fs::read_to_string(gen_file).unwrap().trim(), "generated");

    let util = &root.dependencies["//py:util"];
    let linked = util.linked_path.clone().unwrap();
    assert_eq!(linked, run.namespace().join("interpreted-library/site/acme_util"));
    assert!(linked.join("__init__.py").exists());
    assert!(util.artifact("build-info").is_some());
  }

  #[test]
  fn libraries_sharing_an_import_name_conflict() {
    let ws = Workspace::new();
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "root": {"deps": ["//a:util", "//b:util"]},
        "a:util": {"kind": "interpreted-library"},
        "b:util": {"kind": "interpreted-library"}
      }}),
    );
    std::fs::create_dir_all(repo.join("a")).unwrap();
    std::fs::create_dir_all(repo.join("b")).unwrap();

    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();

    let mut run = Orchestrator::new(&graph, Registry::standard(), ws.config(), BuildOptions::default());
    let err = run.build(&app_key("root")).unwrap_err();

    assert_eq!(err.target(), Some(&app_key("b:util")));
    assert!(matches!(err, BuildError::Target { source: BackendError::LinkConflict { .. }, .. }));

    let site = run.namespace().join("interpreted-library/site/util");
    assert_eq!(std::fs::read_link(site).unwrap(), repo.join("a"));
  }
}
