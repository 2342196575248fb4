//! Specification types.
//!
//! These mirror the on-disk `polybuild.json` format:
//! - [`RepositorySpec`] - One repository: uri, default targets, targets, references
//! - [`TargetSpec`] - One declared target with its kind, dependencies and backend payload
//! - [`DependencySpec`] - A dependency edge as written (reference text plus `build` flag)
//! - [`ReferenceSpec`] - A named pointer to another repository with its finder chain
//! - [`FinderSpec`] - One local-override strategy

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of buildable target kinds.
///
/// A target without a kind is an aggregation node: its dependencies are built
/// but no backend runs for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
  /// A shell command.
  Command,
  /// A binary produced by a compiler toolchain.
  CompiledBinary,
  /// A library for an interpreted language, linked into a shared site directory.
  InterpretedLibrary,
  /// A container image built by an image daemon.
  ContainerImage,
}

impl TargetKind {
  /// All kinds, in registry order.
  pub const ALL: [TargetKind; 4] = [
    TargetKind::Command,
    TargetKind::CompiledBinary,
    TargetKind::InterpretedLibrary,
    TargetKind::ContainerImage,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      TargetKind::Command => "command",
      TargetKind::CompiledBinary => "compiled-binary",
      TargetKind::InterpretedLibrary => "interpreted-library",
      TargetKind::ContainerImage => "container-image",
    }
  }
}

impl fmt::Display for TargetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Kinds of auxiliary package-manager dependencies.
///
/// These are not targets: they name packages that a language package manager
/// installs once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
  Pip,
  Go,
}

impl PackageKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      PackageKind::Pip => "pip",
      PackageKind::Go => "go",
    }
  }
}

impl fmt::Display for PackageKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PackageKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pip" => Ok(PackageKind::Pip),
      "go" => Ok(PackageKind::Go),
      other => Err(format!("unknown package kind '{}' (expected pip or go)", other)),
    }
  }
}

/// A dependency edge as declared in the specification.
///
/// Either a bare reference string, which is built along with its dependent,
/// or a table that can opt out of transitive building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
  /// `"//tools:gen"`
  Ref(String),
  /// `{ "target": "//tools:gen", "build": false }`
  Detailed {
    target: String,
    #[serde(default = "default_build")]
    build: bool,
  },
}

fn default_build() -> bool {
  true
}

impl DependencySpec {
  /// The reference text of the dependency.
  pub fn target(&self) -> &str {
    match self {
      DependencySpec::Ref(target) => target,
      DependencySpec::Detailed { target, .. } => target,
    }
  }

  /// Whether building the dependent also builds this dependency.
  pub fn build(&self) -> bool {
    match self {
      DependencySpec::Ref(_) => true,
      DependencySpec::Detailed { build, .. } => *build,
    }
  }
}

/// One declared target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
  /// Declared kind; `None` makes the target an aggregation node.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<TargetKind>,

  /// Local path relative to the repository root. Defaults to the target's package.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,

  /// Ordered dependency edges.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub deps: Vec<DependencySpec>,

  /// Auxiliary package-manager dependencies, keyed by package kind.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub packages: BTreeMap<PackageKind, Vec<String>>,

  /// Backend-specific payload, interpreted by the backend for `kind`.
  #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
  pub spec: serde_json::Value,
}

/// A local-override strategy for a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FinderSpec {
  /// Look a dotted module name up on the module search path.
  Module {
    module: String,
    #[serde(default)]
    strip: usize,
  },
  /// Look a package path up under the package roots.
  Package {
    package: String,
    #[serde(default)]
    strip: usize,
  },
}

/// A named pointer from one repository to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceSpec {
  /// Remote locator of the referenced repository. Also its logical uri.
  pub remote: String,

  /// Local-override strategies, tried in order.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub finders: Vec<FinderSpec>,
}

/// A parsed repository specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositorySpec {
  /// Logical repository name. Falls back to the source path when absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uri: Option<String>,

  /// Targets built when a locator names the repository but no target.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub default_targets: Vec<String>,

  /// All declared targets, keyed by `name` or `package/path:name`.
  #[serde(default)]
  pub targets: BTreeMap<String, TargetSpec>,

  /// Named references to other repositories.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub references: BTreeMap<String, ReferenceSpec>,
}

impl RepositorySpec {
  /// Look up a target by its qualified name.
  pub fn target(&self, name: &str) -> Option<&TargetSpec> {
    self.targets.get(name)
  }

  /// Look up a reference by name.
  pub fn reference(&self, name: &str) -> Option<&ReferenceSpec> {
    self.references.get(name)
  }

  /// Qualified names of all declared targets, in sorted order.
  pub fn target_names(&self) -> impl Iterator<Item = &str> {
    self.targets.keys().map(|s| s.as_str())
  }
}
