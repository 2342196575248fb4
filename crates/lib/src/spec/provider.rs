//! Specification providers.
//!
//! The target graph never reads specification files itself; it asks a
//! [`SpecProvider`] for the parsed [`RepositorySpec`] of a physical source.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::types::RepositorySpec;
use crate::consts::SPEC_FILENAME;
use crate::locator::{LocatorError, split_target_name};

/// Errors that can occur while obtaining a repository specification.
#[derive(Debug, Error)]
pub enum SpecError {
  /// No specification exists at the source.
  #[error("no repository specification found at '{0}'")]
  NotFound(PathBuf),

  /// The specification file could not be read.
  #[error("failed to read specification '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The specification file is not valid JSON for the expected schema.
  #[error("failed to parse specification '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  /// The specification parsed but is internally inconsistent.
  #[error("invalid specification '{path}': {reason}")]
  Invalid { path: PathBuf, reason: String },
}

/// Yields the parsed specification of a repository source.
pub trait SpecProvider {
  /// Load the specification of the repository rooted at `source`.
  fn load(&self, source: &Path) -> Result<RepositorySpec, SpecError>;
}

/// Reads `polybuild.json` from the repository root.
///
/// If `source` points at a file rather than a directory, that file is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSpecProvider;

impl SpecProvider for JsonSpecProvider {
  fn load(&self, source: &Path) -> Result<RepositorySpec, SpecError> {
    let path = if source.is_dir() {
      source.join(SPEC_FILENAME)
    } else {
      source.to_path_buf()
    };

    if !path.is_file() {
      return Err(SpecError::NotFound(source.to_path_buf()));
    }

    debug!(path = %path.display(), "reading repository specification");

    let content = fs::read_to_string(&path).map_err(|source| SpecError::Read {
      path: path.clone(),
      source,
    })?;
    let spec: RepositorySpec = serde_json::from_str(&content).map_err(|source| SpecError::Parse {
      path: path.clone(),
      source,
    })?;

    validate(&spec).map_err(|reason| SpecError::Invalid { path, reason })?;
    Ok(spec)
  }
}

/// Serves specifications from memory.
///
/// Useful for hosts that produce specifications from another front end, and
/// for tests. Sources are matched after canonicalization, so a spec registered
/// for an existing directory is found however that directory is spelled.
#[derive(Debug, Clone, Default)]
pub struct StaticSpecProvider {
  specs: HashMap<PathBuf, RepositorySpec>,
}

impl StaticSpecProvider {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a specification for a source.
  pub fn insert(&mut self, source: impl AsRef<Path>, spec: RepositorySpec) {
    self.specs.insert(canonical(source.as_ref()), spec);
  }

  /// Builder form of [`insert`](Self::insert).
  pub fn with(mut self, source: impl AsRef<Path>, spec: RepositorySpec) -> Self {
    self.insert(source, spec);
    self
  }
}

impl SpecProvider for StaticSpecProvider {
  fn load(&self, source: &Path) -> Result<RepositorySpec, SpecError> {
    let spec = self
      .specs
      .get(&canonical(source))
      .cloned()
      .ok_or_else(|| SpecError::NotFound(source.to_path_buf()))?;

    validate(&spec).map_err(|reason| SpecError::Invalid {
      path: source.to_path_buf(),
      reason,
    })?;
    Ok(spec)
  }
}

/// Canonicalize a path if it exists, otherwise return it unchanged.
pub(crate) fn canonical(path: &Path) -> PathBuf {
  dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Check target names and default targets.
fn validate(spec: &RepositorySpec) -> Result<(), String> {
  for name in spec.target_names() {
    split_target_name(name).map_err(|e: LocatorError| format!("target '{}': {}", name, e))?;
  }

  for name in &spec.default_targets {
    if spec.target(name).is_none() {
      return Err(format!("default target '{}' is not declared", name));
    }
  }

  for (name, reference) in &spec.references {
    if name.is_empty() || name.contains('/') {
      return Err(format!("invalid reference name '{}'", name));
    }
    if reference.remote.is_empty() {
      return Err(format!("reference '{}' has an empty remote", name));
    }
  }

  Ok(())
}
