//! Build backends.
//!
//! Every buildable [`TargetKind`] maps to exactly one [`BuildBackend`]. A
//! backend turns one target's `spec` payload into one build action and one or
//! more [`Artifact`]s. The [`Registry`] holding them is filled from a single
//! static table and handed to the orchestrator at construction.
//!
//! # Modules
//!
//! - [`command`] - Shell commands with declared outputs
//! - [`binary`] - Compiler toolchain invocations
//! - [`library`] - Interpreted-language libraries linked into a shared site directory
//! - [`image`] - Container images built by an image daemon
//! - [`process`] - Timeout-bounded external process execution

pub mod binary;
pub mod command;
pub mod image;
pub mod library;
pub mod process;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::build::{Artifact, BuildContext};
use crate::graph::Target;
use crate::spec::TargetKind;
use process::ProcessError;

/// Errors raised by a backend while building one target.
#[derive(Debug, Error)]
pub enum BackendError {
  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error("{context}: {source}")]
  Io {
    context: String,
    #[source]
    source: std::io::Error,
  },

  /// The target's `spec` payload does not match what the backend expects.
  #[error("invalid {kind} spec: {message}")]
  InvalidSpec { kind: TargetKind, message: String },

  /// The build finished but a declared output is missing.
  #[error("declared output '{}' was not produced", path.display())]
  MissingOutput { path: PathBuf },

  /// The spec names a dependency that was not built in this run.
  #[error("dependency '{0}' has no build result in this run")]
  MissingDependency(String),

  /// The spec names an artifact a dependency did not produce.
  #[error("dependency '{dependency}' has no artifact '{artifact}'")]
  MissingArtifact { dependency: String, artifact: String },

  /// Two artifacts of one target share a name.
  #[error("artifact name '{0}' is produced more than once")]
  DuplicateArtifact(String),

  /// A shared environment entry is already taken by another target's sources.
  #[error("'{}' already links '{}', refusing to replace it with '{}'", link.display(), existing.display(), wanted.display())]
  LinkConflict {
    link: PathBuf,
    existing: PathBuf,
    wanted: PathBuf,
  },
}

impl BackendError {
  pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> BackendError {
    let context = context.into();
    move |source| BackendError::Io { context, source }
  }
}

/// The per-kind environment shared by every target of that kind in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnv {
  pub kind: TargetKind,
  pub root: PathBuf,
}

/// Builds targets of one kind.
pub trait BuildBackend {
  fn kind(&self) -> TargetKind;

  /// Create the kind's environment under `root`. Called at most once per run.
  fn create_env(&self, root: &Path) -> Result<BuildEnv, BackendError> {
    Ok(BuildEnv {
      kind: self.kind(),
      root: root.to_path_buf(),
    })
  }

  /// Link or stage a target into the environment before anything is built.
  ///
  /// Returns the linked path, if the backend links.
  fn prepare(&self, _target: &Target, _env: &BuildEnv, _ctx: &BuildContext) -> Result<Option<PathBuf>, BackendError> {
    Ok(None)
  }

  fn build(&self, target: &Target, ctx: &BuildContext) -> Result<Vec<Artifact>, BackendError>;
}

type Constructor = fn() -> Box<dyn BuildBackend>;

const STANDARD_BACKENDS: &[(TargetKind, Constructor)] = &[
  (TargetKind::Command, command::backend),
  (TargetKind::CompiledBinary, binary::backend),
  (TargetKind::InterpretedLibrary, library::backend),
  (TargetKind::ContainerImage, image::backend),
];

/// Maps each target kind to its backend.
pub struct Registry {
  backends: BTreeMap<TargetKind, Box<dyn BuildBackend>>,
}

impl Default for Registry {
  fn default() -> Self {
    Self::standard()
  }
}

impl Registry {
  /// Every built-in backend.
  pub fn standard() -> Self {
    Self {
      backends: STANDARD_BACKENDS.iter().map(|(kind, ctor)| (*kind, ctor())).collect(),
    }
  }

  /// No backends at all.
  pub fn empty() -> Self {
    Self {
      backends: BTreeMap::new(),
    }
  }

  /// Register `backend` for its kind, replacing any existing entry.
  pub fn with(mut self, backend: impl BuildBackend + 'static) -> Self {
    self.backends.insert(backend.kind(), Box::new(backend));
    self
  }

  pub fn get(&self, kind: TargetKind) -> Option<&dyn BuildBackend> {
    self.backends.get(&kind).map(|b| b.as_ref())
  }

  pub fn kinds(&self) -> impl Iterator<Item = TargetKind> + '_ {
    self.backends.keys().copied()
  }
}

/// Deserialize a target's `spec` payload. A missing payload reads as `{}`.
pub(crate) fn parse_spec<T: DeserializeOwned>(target: &Target) -> Result<T, BackendError> {
  let kind = target.kind.unwrap_or(TargetKind::Command);
  let value = match &target.spec {
    serde_json::Value::Null => serde_json::Value::Object(Default::default()),
    other => other.clone(),
  };
  serde_json::from_value(value).map_err(|e| BackendError::InvalidSpec {
    kind,
    message: e.to_string(),
  })
}
