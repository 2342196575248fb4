use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::graph::TargetKey;
use crate::platform::paths;
use crate::resolve::SearchPaths;
use crate::spec::{PackageKind, TargetKind};

/// Identifier minted once per orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BuildTag(Uuid);

impl BuildTag {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl Default for BuildTag {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for BuildTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A typed build output. Names are unique within the producing target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Artifact {
  File {
    name: String,
    /// The file, or the directory holding `files`.
    path: PathBuf,
    /// Member files when the artifact is a directory, relative to `path`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    files: Vec<PathBuf>,
    compressed: bool,
  },
  ContainerImage {
    name: String,
    repository: String,
    image: String,
    tag: String,
  },
}

impl Artifact {
  /// A single uncompressed file.
  pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
    Artifact::File {
      name: name.into(),
      path: path.into(),
      files: Vec::new(),
      compressed: false,
    }
  }

  pub fn name(&self) -> &str {
    match self {
      Artifact::File { name, .. } | Artifact::ContainerImage { name, .. } => name,
    }
  }

  /// Filesystem path of a `File` artifact.
  pub fn path(&self) -> Option<&Path> {
    match self {
      Artifact::File { path, .. } => Some(path),
      Artifact::ContainerImage { .. } => None,
    }
  }

  /// `repository/image:tag` of a container image.
  pub fn image_reference(&self) -> Option<String> {
    match self {
      Artifact::ContainerImage {
        repository, image, tag, ..
      } => Some(format!("{}/{}:{}", repository, image, tag)),
      Artifact::File { .. } => None,
    }
  }
}

/// What one target's build produced.
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
  pub key: TargetKey,
  pub tag: BuildTag,
  pub started_at: DateTime<Utc>,
  #[serde(serialize_with = "serialize_duration_ms", rename = "duration_ms")]
  pub duration: Duration,
  /// `None` for aggregation targets.
  pub builder: Option<TargetKind>,
  pub source_path: PathBuf,
  /// Where `prepare` linked the sources, for kinds that link.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub linked_path: Option<PathBuf>,
  /// The target's private output directory, if it asked for one.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output_path: Option<PathBuf>,
  pub artifacts: Vec<Artifact>,
  /// Results of the dependencies built in this run, by dependency name.
  #[serde(serialize_with = "serialize_dependency_keys")]
  pub dependencies: BTreeMap<String, Arc<BuildResult>>,
}

impl BuildResult {
  pub fn artifact(&self, name: &str) -> Option<&Artifact> {
    self.artifacts.iter().find(|a| a.name() == name)
  }
}

fn serialize_duration_ms<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_u64(duration.as_millis() as u64)
}

fn serialize_dependency_keys<S: Serializer>(
  deps: &BTreeMap<String, Arc<BuildResult>>,
  serializer: S,
) -> Result<S::Ok, S::Error> {
  serializer.collect_map(deps.iter().map(|(name, result)| (name, result.key.to_string())))
}

/// Per-run selective-build options.
#[derive(Debug, Clone)]
pub struct BuildOptions {
  /// Follow `build = true` edges. When false only the root itself is built.
  pub build_dependencies: bool,
  /// Package kinds whose installs are skipped entirely.
  pub skip_packages: BTreeSet<PackageKind>,
  /// Pass the installer's update arguments.
  pub force_update: bool,
  /// Build the dependencies of the root but not the root.
  pub skip_root: bool,
  /// Package kinds whose install failures are logged instead of fatal.
  pub ignore_install_errors: BTreeSet<PackageKind>,
  /// Link the root's file artifacts here.
  pub output_dir: Option<PathBuf>,
  pub verbose: bool,
}

impl Default for BuildOptions {
  fn default() -> Self {
    Self {
      build_dependencies: true,
      skip_packages: BTreeSet::new(),
      force_update: false,
      skip_root: false,
      ignore_install_errors: BTreeSet::new(),
      output_dir: None,
      verbose: false,
    }
  }
}

/// How to invoke a language package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installer {
  /// Program and leading arguments; package names are appended.
  pub command: Vec<String>,
  /// Appended when updates are forced.
  pub update_args: Vec<String>,
  /// Flag that precedes the install root, if the installer takes one.
  pub root_arg: Option<String>,
  /// Environment variable that receives the install root, if any.
  pub root_env: Option<String>,
}

impl Installer {
  pub fn pip() -> Self {
    Self {
      command: ["python3", "-m", "pip", "install", "--quiet"].map(String::from).to_vec(),
      update_args: vec!["--upgrade".to_string()],
      root_arg: Some("--target".to_string()),
      root_env: None,
    }
  }

  pub fn go() -> Self {
    Self {
      command: ["go", "install"].map(String::from).to_vec(),
      update_args: Vec::new(),
      root_arg: None,
      root_env: Some("GOBIN".to_string()),
    }
  }
}

/// Machine-level configuration shared by every run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Every run gets `<build_root>/<tag>`.
  pub build_root: PathBuf,
  /// Bound on each external process call.
  pub command_timeout: Option<Duration>,
  /// Shell for command targets. `None` uses the platform default.
  pub shell: Option<String>,
  /// Image daemon client used by container-image targets.
  pub container_cli: String,
  pub installers: BTreeMap<PackageKind, Installer>,
  pub search_paths: SearchPaths,
  /// Run reference finder chains before falling back to remotes.
  pub local_overrides: bool,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      build_root: paths::build_root(),
      command_timeout: None,
      shell: None,
      container_cli: "docker".to_string(),
      installers: BTreeMap::from([(PackageKind::Pip, Installer::pip()), (PackageKind::Go, Installer::go())]),
      search_paths: SearchPaths::from_env(),
      local_overrides: true,
    }
  }
}
