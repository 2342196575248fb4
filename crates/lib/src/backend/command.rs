//! Shell command targets.
//!
//! ```json
//! { "kind": "command", "spec": { "command": "make dist", "outputs": ["dist/app.tar"], "env": {"MODE": "release"} } }
//! ```
//!
//! The command runs in the target's directory with the provenance variables
//! set. Outputs are paths relative to the target's output directory
//! (`$PB_OUTPUT_PATH`); each becomes a file artifact named after its file name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use super::{BackendError, BuildBackend, parse_spec};
use crate::build::{Artifact, BuildContext};
use crate::graph::Target;
use crate::spec::TargetKind;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandSpec {
  command: String,
  #[serde(default)]
  outputs: Vec<String>,
  #[serde(default)]
  env: BTreeMap<String, String>,
}

pub struct CommandBackend;

pub(crate) fn backend() -> Box<dyn BuildBackend> {
  Box::new(CommandBackend)
}

impl BuildBackend for CommandBackend {
  fn kind(&self) -> TargetKind {
    TargetKind::Command
  }

  fn build(&self, target: &Target, ctx: &BuildContext) -> Result<Vec<Artifact>, BackendError> {
    let spec: CommandSpec = parse_spec(target)?;
    let out = ctx
      .output_dir()
      .map_err(BackendError::io("creating output directory"))?
      .to_path_buf();
    let provenance = ctx
      .provenance()
      .map_err(BackendError::io("collecting provenance"))?;

    ctx.run(
      ctx
        .shell(&spec.command)
        .cwd(&target.path)
        .envs(provenance)
        .envs(spec.env),
    )?;

    spec.outputs.iter().map(|output| collect_output(&out, output)).collect()
  }
}

/// Turn a declared output into an artifact. Directories list their files.
pub(crate) fn collect_output(out: &Path, output: &str) -> Result<Artifact, BackendError> {
  let path = out.join(output);
  if !path.exists() {
    return Err(BackendError::MissingOutput { path });
  }

  let name = path
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_else(|| output.to_string());

  let files = if path.is_dir() {
    list_files(&path)?
  } else {
    Vec::new()
  };
  debug!(artifact = %name, path = %path.display(), files = files.len(), "collected output");

  Ok(Artifact::File {
    name,
    path,
    files,
    compressed: false,
  })
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, BackendError> {
  let mut files = Vec::new();
  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(|e| BackendError::Io {
      context: format!("listing '{}'", dir.display()),
      source: e.into(),
    })?;
    if entry.file_type().is_file() {
      files.push(entry.path().strip_prefix(dir).unwrap_or(entry.path()).to_path_buf());
    }
  }
  Ok(files)
}
