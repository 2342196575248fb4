//! Container image targets.
//!
//! A build context directory is staged from dependency artifacts, a
//! `Dockerfile` with provenance labels is generated, and the image daemon
//! client builds and tags `<repository>/<image>:<build tag>`.

use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::process::ProcessSpec;
use super::{BackendError, BuildBackend, parse_spec};
use crate::build::{Artifact, BuildContext};
use crate::consts::provenance;
use crate::graph::Target;
use crate::spec::TargetKind;

pub const ARTIFACT: &str = "image";
const CONTEXT_DIR: &str = "context";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImageSpec {
  repository: String,
  /// Defaults to the target name.
  #[serde(default)]
  image: Option<String>,
  base: String,
  #[serde(default)]
  copy: Vec<CopySpec>,
  #[serde(default)]
  run: Vec<String>,
  #[serde(default)]
  cmd: Vec<String>,
}

/// Copy one artifact of a dependency into the image.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CopySpec {
  /// Dependency name, as written in the target's `deps`.
  dependency: String,
  artifact: String,
  /// Absolute destination inside the image.
  dest: String,
}

pub struct ContainerImageBackend;

pub(crate) fn backend() -> Box<dyn BuildBackend> {
  Box::new(ContainerImageBackend)
}

impl BuildBackend for ContainerImageBackend {
  fn kind(&self) -> TargetKind {
    TargetKind::ContainerImage
  }

  fn build(&self, target: &Target, ctx: &BuildContext) -> Result<Vec<Artifact>, BackendError> {
    let spec: ImageSpec = parse_spec(target)?;
    let image = spec.image.clone().unwrap_or_else(|| target.name().to_string());
    let tag = ctx.tag().to_string();

    let out = ctx.output_dir().map_err(BackendError::io("creating output directory"))?;
    let context_dir = out.join(CONTEXT_DIR);
    fs::create_dir_all(&context_dir).map_err(BackendError::io("creating image build context"))?;

    let staged = stage(&spec.copy, &context_dir, ctx)?;
    let vars = ctx.provenance().map_err(BackendError::io("collecting provenance"))?;
    let dockerfile = render_dockerfile(&spec, &staged, &vars);
    fs::write(context_dir.join("Dockerfile"), dockerfile).map_err(BackendError::io("writing Dockerfile"))?;

    let reference = format!("{}/{}:{}", spec.repository, image, tag);
    ctx.run(
      ProcessSpec::new(&ctx.config().container_cli)
        .args(["build", "-t", reference.as_str()])
        .arg(context_dir.display().to_string())
        .envs(vars),
    )?;
    info!(target = %target.key, image = %reference, "built image");

    Ok(vec![Artifact::ContainerImage {
      name: ARTIFACT.to_string(),
      repository: spec.repository,
      image,
      tag,
    }])
  }
}

/// Copy dependency artifacts into the context. Returns `(context-relative source, dest)` pairs.
fn stage(copies: &[CopySpec], context_dir: &Path, ctx: &BuildContext) -> Result<Vec<(String, String)>, BackendError> {
  let mut staged = Vec::with_capacity(copies.len());

  for (index, copy) in copies.iter().enumerate() {
    let dependency = ctx
      .dependency(&copy.dependency)
      .ok_or_else(|| BackendError::MissingDependency(copy.dependency.clone()))?;
    let path = dependency
      .artifact(&copy.artifact)
      .and_then(Artifact::path)
      .ok_or_else(|| BackendError::MissingArtifact {
        dependency: copy.dependency.clone(),
        artifact: copy.artifact.clone(),
      })?;

    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_else(|| copy.artifact.clone());
    let relative = PathBuf::from(format!("{}", index)).join(&file_name);
    let staged_path = context_dir.join(&relative);

    copy_recursively(path, &staged_path)
      .map_err(BackendError::io(format!("staging '{}'", path.display())))?;
    debug!(dependency = %copy.dependency, artifact = %copy.artifact, dest = %copy.dest, "staged artifact");

    staged.push((to_slash(&relative), copy.dest.clone()));
  }

  Ok(staged)
}

fn copy_recursively(from: &Path, to: &Path) -> std::io::Result<()> {
  if from.is_dir() {
    for entry in walkdir::WalkDir::new(from) {
      let entry = entry?;
      let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
      let dest = to.join(relative);
      if entry.file_type().is_dir() {
        fs::create_dir_all(&dest)?;
      } else {
        fs::copy(entry.path(), &dest)?;
      }
    }
    return Ok(());
  }

  if let Some(parent) = to.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::copy(from, to).map(|_| ())
}

fn to_slash(path: &Path) -> String {
  path
    .components()
    .filter_map(|c| match c {
      Component::Normal(part) => Some(part.to_string_lossy()),
      _ => None,
    })
    .collect::<Vec<_>>()
    .join("/")
}

fn render_dockerfile(
  spec: &ImageSpec,
  staged: &[(String, String)],
  vars: &std::collections::BTreeMap<String, String>,
) -> String {
  let label = |key: &str| vars.get(key).map(String::as_str).unwrap_or_default();

  let mut dockerfile = format!("FROM {}\n", spec.base);
  let _ = writeln!(dockerfile, "LABEL polybuild.branch=\"{}\"", label(provenance::BRANCH));
  let _ = writeln!(dockerfile, "LABEL polybuild.commit=\"{}\"", label(provenance::COMMIT));
  let _ = writeln!(dockerfile, "LABEL polybuild.tag=\"{}\"", label(provenance::BUILD_TAG));
  let _ = writeln!(dockerfile, "LABEL polybuild.build-time=\"{}\"", label(provenance::BUILD_TIME));

  for (source, dest) in staged {
    let _ = writeln!(dockerfile, "COPY {} {}", source, dest);
  }
  for command in &spec.run {
    let _ = writeln!(dockerfile, "RUN {}", command);
  }
  if !spec.cmd.is_empty() {
    let cmd = serde_json::to_string(&spec.cmd).unwrap_or_default();
    let _ = writeln!(dockerfile, "CMD {}", cmd);
  }

  dockerfile
}
