//! Loading repositories from `polybuild.json` files on disk.

use polybuild_lib::graph::{GraphError, LoadOptions, TargetKey};
use polybuild_lib::locator::{Locator, LocatorError};
use polybuild_lib::resolve::SearchPaths;
use polybuild_lib::spec::SpecError;
use serde_json::json;

use super::common::*;

mod loading {
  use super::*;

  #[test]
  fn uri_falls_back_to_source_path() {
    let ws = Workspace::new();
    let repo = ws.repo("anon", json!({"targets": {"a": {}}}));
    let mut graph = graph();

    let keys = graph.load(&repo, LoadOptions::default()).unwrap();
    assert_eq!(keys, vec![key(&repo, "a")]);
  }

  #[test]
  fn missing_spec_file_is_load_error() {
    let ws = Workspace::new();
    let mut graph = graph();

    let err = graph.load(ws.path().join("nowhere"), LoadOptions::default()).unwrap_err();
    assert!(matches!(err, GraphError::Spec { source: SpecError::NotFound(_), .. }));
  }

  #[test]
  fn malformed_spec_is_load_error() {
    let ws = Workspace::new();
    let repo = ws.repo("bad", json!({"targets": {"a": {"kind": "fortran-binary"}}}));
    let mut graph = graph();

    let err = graph.load(&repo, LoadOptions::default()).unwrap_err();
    assert!(matches!(err, GraphError::Spec { source: SpecError::Parse { .. }, .. }));
  }

  #[test]
  fn locator_with_two_selectors_fails_to_parse() {
    let err = "repo///@b1///@b2".parse::<Locator>().unwrap_err();
    assert!(matches!(err, LocatorError::MultipleSelectors(_)));
  }

  #[test]
  fn locator_targets_resolve_against_current_directory() {
    let ws = Workspace::new();
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "default_targets": ["server"], "targets": {
        "server": {"deps": ["cmd:cli"]},
        "cmd:cli": {}
      }}),
    );
    let mut graph = graph();

    let locator: Locator = "app///=deadbeef".parse().unwrap();
    let keys = graph.load_locator(&locator, &ws.path()).unwrap();
    assert_eq!(keys, vec![TargetKey::new("app", "server")]);

    let repository = graph.repository("app").unwrap();
    assert_eq!(repository.source, repo);
    assert_eq!(repository.metadata.commit.as_deref(), Some("deadbeef"));
  }
}

mod references {
  use super::*;

  #[test]
  fn reference_resolves_through_package_finder() {
    let ws = Workspace::new();
    ws.repo(
      "gopath/src/github.com/acme/common",
      json!({"targets": {"proto:api": {"kind": "command"}}}),
    );
    let app = ws.repo(
      "app",
      json!({
        "uri": "app",
        "targets": {"server": {"deps": ["@common//proto:api"]}},
        "references": {"common": {
          "remote": "github.com/acme/common",
          "finders": [{"package": "github.com/acme/common"}]
        }}
      }),
    );

    let mut graph = graph_with(SearchPaths {
      module_path: vec![],
      package_roots: vec![ws.path().join("gopath/src")],
    });
    graph.load(&app, LoadOptions::default()).unwrap();

    let server = graph.target(&TargetKey::new("app", "server")).unwrap();
    let dep = &server.deps[0];
    assert_eq!(dep.key, TargetKey::new("github.com/acme/common", "proto:api"));

    let common = graph.repository("github.com/acme/common").unwrap();
    assert_eq!(common.source, ws.path().join("gopath/src/github.com/acme/common"));
    assert_eq!(
      graph.target(&dep.key).unwrap().path,
      common.source.join("proto")
    );
  }

  #[test]
  fn first_matching_finder_wins() {
    let ws = Workspace::new();
    ws.repo("py/acme_common", json!({"targets": {"lib": {}}}));
    ws.repo("go/src/github.com/acme/common", json!({"targets": {"lib": {}, "other": {}}}));
    let app = ws.repo(
      "app",
      json!({
        "uri": "app",
        "targets": {"a": {"deps": ["@common//:lib"]}},
        "references": {"common": {
          "remote": "github.com/acme/common",
          "finders": [{"module": "acme_common"}, {"package": "github.com/acme/common"}]
        }}
      }),
    );
    let search_paths = SearchPaths {
      module_path: vec![ws.path().join("py")],
      package_roots: vec![ws.path().join("go/src")],
    };

    for _ in 0..3 {
      let mut graph = graph_with(search_paths.clone());
      graph.load(&app, LoadOptions::default()).unwrap();
      let common = graph.repository("github.com/acme/common").unwrap();
      assert_eq!(common.source, ws.path().join("py/acme_common"));
    }
  }

  #[test]
  fn module_finder_strips_parent_directories() {
    let ws = Workspace::new();
    let common = ws.repo("checkout/common", json!({"targets": {"lib": {}}}));
    std::fs::create_dir_all(common.join("src/acme_common")).unwrap();
    let app = ws.repo(
      "app",
      json!({
        "uri": "app",
        "targets": {"a": {"deps": ["@common//:lib"]}},
        "references": {"common": {
          "remote": "github.com/acme/common",
          "finders": [{"module": "acme_common", "strip": 2}]
        }}
      }),
    );

    let mut graph = graph_with(SearchPaths {
      module_path: vec![common.join("src")],
      package_roots: vec![],
    });
    graph.load(&app, LoadOptions::default()).unwrap();
    assert_eq!(graph.repository("github.com/acme/common").unwrap().source, common);
  }

  #[test]
  fn unresolved_reference_is_unsupported() {
    let ws = Workspace::new();
    let app = ws.repo(
      "app",
      json!({
        "uri": "app",
        "targets": {"a": {"deps": ["@common//:lib"]}},
        "references": {"common": {"remote": "github.com/acme/common", "finders": [{"module": "nowhere"}]}}
      }),
    );
    let mut graph = graph();

    let err = graph.load(&app, LoadOptions::default()).unwrap_err();
    assert!(matches!(err, GraphError::Unsupported { .. }));
    assert!(err.to_string().contains("github.com/acme/common"));
    assert!(graph.is_empty());
    assert!(graph.repository("app").is_none());
  }
}

mod invariants {
  use super::*;

  #[test]
  fn same_uri_from_two_sources_conflicts() {
    let ws = Workspace::new();
    let first = ws.repo("one", json!({"uri": "shared", "targets": {"a": {}}}));
    let second = ws.repo("two", json!({"uri": "shared", "targets": {"a": {}}}));
    let mut graph = graph();

    graph.load(&first, LoadOptions::default()).unwrap();
    let err = graph.load(&second, LoadOptions::default()).unwrap_err();
    assert!(matches!(err, GraphError::Conflict { .. }));
    assert_eq!(graph.repository("shared").unwrap().source, first);
  }

  #[test]
  fn reference_override_must_match_loaded_checkout() {
    let ws = Workspace::new();
    let loaded = ws.repo("one/common", json!({"uri": "common", "targets": {"util": {}}}));
    ws.repo("roots/common", json!({"uri": "common", "targets": {"util": {}}}));
    let app = ws.repo(
      "app",
      json!({
        "uri": "app",
        "targets": {"a": {"deps": ["@common//:util"]}},
        "references": {"common": {"remote": "common", "finders": [{"package": "common"}]}}
      }),
    );
    let mut graph = graph_with(SearchPaths {
      module_path: vec![],
      package_roots: vec![ws.path().join("roots")],
    });

    graph.load(&loaded, LoadOptions::default()).unwrap();
    let err = graph.load(&app, LoadOptions::default()).unwrap_err();

    assert!(matches!(err, GraphError::Conflict { ref uri, .. } if uri == "common"));
    assert!(graph.repository("app").is_none());
    assert_eq!(graph.repository("common").unwrap().source, loaded);
  }

  #[test]
  fn reference_override_reuses_same_checkout() {
    let ws = Workspace::new();
    let loaded = ws.repo("roots/common", json!({"uri": "common", "targets": {"util": {}}}));
    let app = ws.repo(
      "app",
      json!({
        "uri": "app",
        "targets": {"a": {"deps": ["@common//:util"]}},
        "references": {"common": {"remote": "common", "finders": [{"package": "common"}]}}
      }),
    );
    let mut graph = graph_with(SearchPaths {
      module_path: vec![],
      package_roots: vec![ws.path().join("roots")],
    });

    graph.load(&loaded, LoadOptions::default()).unwrap();
    graph.load(&app, LoadOptions::default()).unwrap();

    let a = graph.target(&TargetKey::new("app", "a")).unwrap();
    assert_eq!(a.deps[0].key, TargetKey::new("common", "util"));
    assert_eq!(graph.repositories().count(), 2);
  }

  #[test]
  fn cycle_across_repositories_retains_nothing() {
    let ws = Workspace::new();
    let app = ws.repo(
      "app",
      json!({
        "uri": "app",
        "targets": {"a": {"deps": ["@lib//:b"]}},
        "references": {"lib": {"remote": "lib", "finders": [{"package": "lib"}]}}
      }),
    );
    ws.repo(
      "roots/lib",
      json!({
        "uri": "lib",
        "targets": {"b": {"deps": ["@app//:a"]}},
        "references": {"app": {"remote": "app"}}
      }),
    );
    let mut graph = graph_with(SearchPaths {
      module_path: vec![],
      package_roots: vec![ws.path().join("roots")],
    });

    let err = graph.load(&app, LoadOptions::default()).unwrap_err();
    match err {
      GraphError::Cycle { chain } => assert_eq!(chain, "app::a -> lib::b -> app::a"),
      other => panic!("expected a load cycle, got {other}"),
    }
    assert!(graph.is_empty());
    assert_eq!(graph.repositories().count(), 0);
  }

  #[test]
  fn loaded_graph_has_no_dangling_edges() {
    let ws = Workspace::new();
    let repo = ws.repo(
      "app",
      json!({"uri": "app", "targets": {
        "a": {"deps": ["b", "//tools:c"]},
        "b": {"deps": ["tools:c"]},
        "tools:c": {"deps": ["d"]},
        "tools:d": {}
      }}),
    );
    let mut graph = graph();
    graph.load(&repo, LoadOptions::default()).unwrap();

    for target in graph.targets() {
      for dep in &target.deps {
        assert!(graph.target(&dep.key).is_some(), "{} -> {}", target.key, dep.key);
      }
    }
    assert_eq!(graph.len(), 4);
  }
}
