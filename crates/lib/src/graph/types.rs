//! Graph node types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::locator::split_target_name;
use crate::spec::{PackageKind, RepositorySpec, TargetKind};

/// Stable identity of a target: `(repository uri, qualified target name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TargetKey {
  pub repository: String,
  pub name: String,
}

impl TargetKey {
  pub fn new(repository: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      repository: repository.into(),
      name: name.into(),
    }
  }

  /// A single path component safe to use as a directory name.
  pub fn dir_name(&self) -> String {
    let sanitize = |s: &str| {
      s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect::<String>()
    };
    format!("{}__{}", sanitize(&self.repository), sanitize(&self.name))
  }
}

impl fmt::Display for TargetKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}::{}", self.repository, self.name)
  }
}

/// Source-control metadata of a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryMetadata {
  pub branch: Option<String>,
  pub commit: Option<String>,
  pub message: Option<String>,
}

/// A loaded repository.
#[derive(Debug, Clone)]
pub struct Repository {
  /// Logical name; the graph's key for this repository.
  pub uri: String,
  /// Canonical physical location.
  pub source: PathBuf,
  pub metadata: RepositoryMetadata,
  pub spec: RepositorySpec,
  /// References resolved so far: reference name -> repository uri.
  pub(crate) references: BTreeMap<String, String>,
}

impl Repository {
  pub fn new(uri: String, source: PathBuf, metadata: RepositoryMetadata, spec: RepositorySpec) -> Self {
    Self {
      uri,
      source,
      metadata,
      spec,
      references: BTreeMap::new(),
    }
  }

  /// Root directory of the repository.
  ///
  /// A source that points at a specification file is rooted at its directory.
  pub fn root(&self) -> &Path {
    if self.source.is_file() {
      self.source.parent().unwrap_or(&self.source)
    } else {
      &self.source
    }
  }

  /// The uri a reference of this repository resolved to, if it was used.
  pub fn resolved_reference(&self, name: &str) -> Option<&str> {
    self.references.get(name).map(|s| s.as_str())
  }
}

/// A resolved dependency edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
  /// The reference text as written in the specification.
  pub name: String,
  pub key: TargetKey,
  /// Whether building the dependent also builds this dependency.
  pub build: bool,
}

/// A node of the graph.
#[derive(Debug, Clone)]
pub struct Target {
  pub key: TargetKey,
  /// Local filesystem path of the target's sources.
  pub path: PathBuf,
  /// `None` for aggregation targets.
  pub kind: Option<TargetKind>,
  pub deps: Vec<Dependency>,
  /// Auxiliary package-manager dependencies.
  pub packages: BTreeMap<PackageKind, Vec<String>>,
  /// Backend-specific payload.
  pub spec: serde_json::Value,
}

impl Target {
  /// Create a target with no dependencies.
  pub fn new(key: TargetKey, path: impl Into<PathBuf>, kind: Option<TargetKind>) -> Self {
    Self {
      key,
      path: path.into(),
      kind,
      deps: Vec::new(),
      packages: BTreeMap::new(),
      spec: serde_json::Value::Null,
    }
  }

  /// Unqualified name: the part after the package.
  pub fn name(&self) -> &str {
    split_target_name(&self.key.name)
      .map(|(_, name)| name)
      .unwrap_or(self.key.name.as_str())
  }

  /// Package path within the repository; empty for the root package.
  pub fn package(&self) -> &str {
    split_target_name(&self.key.name)
      .map(|(package, _)| package)
      .unwrap_or_default()
  }

  pub fn is_aggregate(&self) -> bool {
    self.kind.is_none()
  }

  /// Look up a dependency edge by the name it was declared with.
  pub fn dependency(&self, name: &str) -> Option<&Dependency> {
    self.deps.iter().find(|d| d.name == name)
  }
}
