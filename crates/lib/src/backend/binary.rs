//! Compiled binary targets.
//!
//! Runs `<toolchain...> <out>/<binary> <args...>` in the target directory,
//! `go build -o <out>/<name> .` unless configured otherwise, and returns the
//! produced file as the artifact `binary`.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::info;

use super::process::ProcessSpec;
use super::{BackendError, BuildBackend, parse_spec};
use crate::build::{Artifact, BuildContext};
use crate::graph::Target;
use crate::spec::TargetKind;

/// Name of the single artifact.
pub const ARTIFACT: &str = "binary";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BinarySpec {
  #[serde(default = "default_toolchain")]
  toolchain: Vec<String>,
  /// Output file name. Defaults to the target name.
  #[serde(default)]
  binary: Option<String>,
  #[serde(default = "default_args")]
  args: Vec<String>,
  #[serde(default)]
  env: BTreeMap<String, String>,
}

fn default_toolchain() -> Vec<String> {
  ["go", "build", "-o"].map(String::from).to_vec()
}

fn default_args() -> Vec<String> {
  vec![".".to_string()]
}

pub struct CompiledBinaryBackend;

pub(crate) fn backend() -> Box<dyn BuildBackend> {
  Box::new(CompiledBinaryBackend)
}

impl BuildBackend for CompiledBinaryBackend {
  fn kind(&self) -> TargetKind {
    TargetKind::CompiledBinary
  }

  fn build(&self, target: &Target, ctx: &BuildContext) -> Result<Vec<Artifact>, BackendError> {
    let spec: BinarySpec = parse_spec(target)?;
    let binary = spec.binary.as_deref().unwrap_or(target.name());
    let out = ctx.output_dir().map_err(BackendError::io("creating output directory"))?;
    let path = out.join(binary);

    let process = ProcessSpec::from_argv(spec.toolchain.iter().cloned())
      .ok_or_else(|| BackendError::InvalidSpec {
        kind: TargetKind::CompiledBinary,
        message: "empty toolchain".to_string(),
      })?
      .arg(path.display().to_string())
      .args(spec.args.iter().cloned())
      .cwd(&target.path)
      .envs(ctx.provenance().map_err(BackendError::io("collecting provenance"))?)
      .envs(spec.env);

    ctx.run(process)?;

    if !path.exists() {
      return Err(BackendError::MissingOutput { path });
    }
    info!(target = %target.key, path = %path.display(), "built binary");

    Ok(vec![Artifact::file(ARTIFACT, path)])
  }
}
