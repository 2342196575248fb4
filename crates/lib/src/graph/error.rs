//! Graph loading errors.

use std::path::PathBuf;

use thiserror::Error;

use super::types::TargetKey;
use crate::locator::LocatorError;
use crate::resolve::ResolveError;
use crate::spec::SpecError;

/// Errors that can occur while loading or walking the target graph.
#[derive(Debug, Error)]
pub enum GraphError {
  /// The repository specification could not be obtained.
  #[error("failed to load repository '{source_path}': {source}")]
  Spec {
    source_path: PathBuf,
    #[source]
    source: SpecError,
  },

  /// A locator could not be parsed.
  #[error(transparent)]
  Locator(#[from] LocatorError),

  /// A requested target is not declared by its repository.
  #[error("target '{name}' not found in repository '{repository}'")]
  TargetNotFound { repository: String, name: String },

  /// A dependency names a target its repository does not declare.
  #[error("{from}: dependency '{reference}' names unknown target '{missing}'")]
  DependencyNotFound {
    from: TargetKey,
    reference: String,
    missing: TargetKey,
  },

  /// A dependency reference could not be parsed.
  #[error("{from}: {source}")]
  InvalidDependency {
    from: TargetKey,
    #[source]
    source: LocatorError,
  },

  /// A dependency names a reference its repository does not declare.
  #[error("{from}: reference '{reference}' is not declared")]
  ReferenceNotFound { from: TargetKey, reference: String },

  /// The same repository uri was requested from two physical sources.
  #[error("repository '{uri}' is already loaded from '{cached}', cannot load it from '{requested}'")]
  Conflict {
    uri: String,
    cached: PathBuf,
    requested: PathBuf,
  },

  /// A target transitively depends on itself.
  #[error("target loading loop: {chain}")]
  Cycle { chain: String },

  /// Resolution needed an unimplemented path, such as a remote fetch.
  #[error("{from}: {source}")]
  Unsupported {
    from: TargetKey,
    #[source]
    source: ResolveError,
  },

  /// An edge points at a target missing from the graph.
  #[error("dangling dependency edge {from} -> {to}")]
  DanglingDependency { from: TargetKey, to: TargetKey },

  /// A target references a repository that is not loaded.
  #[error("repository '{0}' is not loaded")]
  RepositoryNotLoaded(String),
}

impl GraphError {
  /// Whether this is a load-time cycle.
  pub fn is_cycle(&self) -> bool {
    matches!(self, GraphError::Cycle { .. })
  }
}
