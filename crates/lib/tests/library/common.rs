//! Shared helpers for library integration tests.

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use polybuild_lib::backend::{BackendError, BuildBackend, BuildEnv, Registry};
use polybuild_lib::build::{Artifact, BuildConfig, BuildContext};
use polybuild_lib::consts::SPEC_FILENAME;
use polybuild_lib::graph::{Target, TargetGraph, TargetKey};
use polybuild_lib::resolve::{ReferenceResolver, SearchPaths};
use polybuild_lib::spec::{JsonSpecProvider, TargetKind};
use tempfile::TempDir;

/// Isolated directory holding repositories and the build root.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap()
  }

  /// Write `polybuild.json` into `dir` (relative to the workspace) and return the directory.
  pub fn repo(&self, dir: &str, spec: serde_json::Value) -> PathBuf {
    let root = self.path().join(dir);
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join(SPEC_FILENAME), serde_json::to_string_pretty(&spec).unwrap()).unwrap();
    root
  }

  pub fn build_root(&self) -> PathBuf {
    self.path().join("build")
  }

  pub fn config(&self) -> BuildConfig {
    BuildConfig {
      build_root: self.build_root(),
      command_timeout: Some(Duration::from_secs(30)),
      search_paths: SearchPaths::default(),
      ..Default::default()
    }
  }
}

/// A graph reading `polybuild.json` files, with finders searching `search_paths`.
pub fn graph_with(search_paths: SearchPaths) -> TargetGraph {
  TargetGraph::new(Box::new(JsonSpecProvider), ReferenceResolver::new(search_paths, true))
}

pub fn graph() -> TargetGraph {
  graph_with(SearchPaths::default())
}

/// One backend invocation as seen by [`RecordingBackend`].
#[derive(Debug, Clone)]
pub struct Call {
  pub key: TargetKey,
  /// Dependency names that had a result when the target was built.
  pub deps: Vec<String>,
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

/// Records every build and produces one file artifact named `out`.
pub struct RecordingBackend {
  pub kind: TargetKind,
  pub calls: CallLog,
  /// Artifact names to produce instead of the default `out`.
  pub names: Vec<&'static str>,
  /// How many environments were created.
  pub envs: Rc<Cell<usize>>,
}

impl RecordingBackend {
  pub fn new(kind: TargetKind) -> (Self, CallLog) {
    let calls = CallLog::default();
    (
      Self {
        kind,
        calls: calls.clone(),
        names: vec!["out"],
        envs: Rc::default(),
      },
      calls,
    )
  }
}

impl BuildBackend for RecordingBackend {
  fn kind(&self) -> TargetKind {
    self.kind
  }

  fn create_env(&self, root: &Path) -> Result<BuildEnv, BackendError> {
    self.envs.set(self.envs.get() + 1);
    Ok(BuildEnv {
      kind: self.kind,
      root: root.to_path_buf(),
    })
  }

  fn build(&self, target: &Target, ctx: &BuildContext) -> Result<Vec<Artifact>, BackendError> {
    let deps = target
      .deps
      .iter()
      .filter(|d| ctx.dependency(&d.name).is_some())
      .map(|d| d.name.clone())
      .collect();
    self.calls.borrow_mut().push(Call {
      key: target.key.clone(),
      deps,
    });

    let out = ctx.output_dir().map_err(|source| BackendError::Io {
      context: "output dir".to_string(),
      source,
    })?;
    let mut artifacts = Vec::new();
    for name in &self.names {
      let path = out.join(format!("{}.txt", name));
      std::fs::write(&path, target.key.to_string()).unwrap();
      artifacts.push(Artifact::file(*name, path));
    }
    Ok(artifacts)
  }
}

/// Fails every build.
pub struct FailingBackend(pub TargetKind);

impl BuildBackend for FailingBackend {
  fn kind(&self) -> TargetKind {
    self.0
  }

  fn build(&self, target: &Target, _ctx: &BuildContext) -> Result<Vec<Artifact>, BackendError> {
    Err(BackendError::MissingOutput {
      path: target.path.join("never"),
    })
  }
}

/// A registry whose command backend records its calls.
pub fn recording_registry() -> (Registry, CallLog) {
  let (backend, calls) = RecordingBackend::new(TargetKind::Command);
  (Registry::empty().with(backend), calls)
}

pub fn names(calls: &CallLog) -> Vec<String> {
  calls.borrow().iter().map(|c| c.key.name.clone()).collect()
}

pub fn key(repo: &Path, name: &str) -> TargetKey {
  TargetKey::new(repo.display().to_string(), name)
}
