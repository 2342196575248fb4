//! Build run errors.

use std::path::PathBuf;

use thiserror::Error;

use super::install::InstallError;
use crate::backend::BackendError;
use crate::graph::{GraphError, TargetKey};
use crate::spec::{PackageKind, TargetKind};

/// Errors that abort a build run. The first one wins; nothing is retried.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  /// A target was reached again while it was still being built.
  #[error("circle building dependency: {chain}")]
  Cycle { chain: String },

  #[error("{key}: no backend registered for kind '{kind}'")]
  UnknownBuildKind { key: TargetKey, kind: TargetKind },

  #[error("{key}: failed to install {kind} package '{package}': {source}")]
  DependencyInstall {
    key: TargetKey,
    kind: PackageKind,
    package: String,
    #[source]
    source: InstallError,
  },

  /// A backend failed while preparing or building a target.
  #[error("{key}: {source}")]
  Target {
    key: TargetKey,
    #[source]
    source: BackendError,
  },

  #[error("{context}: {source}")]
  Io {
    context: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to materialize outputs into '{}': {source}", path.display())]
  Output {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl BuildError {
  /// Whether this is a build-time cycle.
  pub fn is_cycle(&self) -> bool {
    matches!(self, BuildError::Cycle { .. })
  }

  /// The target the run stopped at, when the error is tied to one.
  pub fn target(&self) -> Option<&TargetKey> {
    match self {
      BuildError::UnknownBuildKind { key, .. }
      | BuildError::DependencyInstall { key, .. }
      | BuildError::Target { key, .. } => Some(key),
      _ => None,
    }
  }
}
