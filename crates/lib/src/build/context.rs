//! The per-target view of a run handed to backends.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};

use super::types::{BuildConfig, BuildResult, BuildTag};
use crate::backend::BuildEnv;
use crate::backend::process::{ProcessError, ProcessOutput, ProcessSpec};
use crate::consts::provenance;
use crate::graph::{Repository, Target, TargetGraph};

/// Everything a backend may consult while building one target.
pub struct BuildContext<'a> {
  pub(crate) graph: &'a TargetGraph,
  pub(crate) target: &'a Target,
  pub(crate) tag: BuildTag,
  pub(crate) build_time: DateTime<Utc>,
  pub(crate) namespace: &'a Path,
  pub(crate) config: &'a BuildConfig,
  pub(crate) verbose: bool,
  pub(crate) dependencies: &'a BTreeMap<String, Arc<BuildResult>>,
  pub(crate) env: Option<&'a BuildEnv>,
  pub(crate) linked_path: Option<&'a Path>,
  pub(crate) output_path: OnceCell<PathBuf>,
}

impl<'a> BuildContext<'a> {
  pub fn tag(&self) -> BuildTag {
    self.tag
  }

  pub fn verbose(&self) -> bool {
    self.verbose
  }

  pub fn config(&self) -> &BuildConfig {
    self.config
  }

  pub fn build_time(&self) -> DateTime<Utc> {
    self.build_time
  }

  /// The target's private output directory, created on first use.
  ///
  /// Lives at `<namespace>/<kind>/<target dir name>`.
  pub fn output_dir(&self) -> io::Result<&Path> {
    if let Some(path) = self.output_path.get() {
      return Ok(path.as_path());
    }

    let kind = self.target.kind.map(|k| k.as_str()).unwrap_or("aggregate");
    let path = self.namespace.join(kind).join(self.target.key.dir_name());
    fs::create_dir_all(&path)?;
    Ok(self.output_path.get_or_init(|| path).as_path())
  }

  /// The output directory, if [`output_dir`](Self::output_dir) was called.
  pub(crate) fn take_output_path(self) -> Option<PathBuf> {
    self.output_path.into_inner()
  }

  /// The result of a dependency built earlier in this run, by the name the
  /// dependency was declared with.
  pub fn dependency(&self, name: &str) -> Option<&BuildResult> {
    self.dependencies.get(name).map(Arc::as_ref)
  }

  /// A loaded repository by uri.
  pub fn repository(&self, uri: &str) -> Option<&Repository> {
    self.graph.repository(uri)
  }

  /// The repository a reference of the target's repository resolved to.
  pub fn reference(&self, name: &str) -> Option<&Repository> {
    self
      .graph
      .repository(&self.target.key.repository)
      .and_then(|repo| repo.resolved_reference(name))
      .and_then(|uri| self.graph.repository(uri))
  }

  /// The per-kind environment created for this run, if the backend has one.
  pub fn env(&self) -> Option<&BuildEnv> {
    self.env
  }

  /// Where `prepare` linked the target's sources.
  pub fn linked_path(&self) -> Option<&Path> {
    self.linked_path
  }

  /// Provenance variables for the target: output path, branch, commit, tag, time.
  pub fn provenance(&self) -> io::Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    vars.insert(provenance::OUTPUT_PATH.to_string(), self.output_dir()?.display().to_string());
    vars.insert(provenance::BUILD_TAG.to_string(), self.tag.to_string());
    vars.insert(
      provenance::BUILD_TIME.to_string(),
      self.build_time.to_rfc3339_opts(SecondsFormat::Secs, true),
    );

    if let Some(repo) = self.graph.repository(&self.target.key.repository) {
      vars.insert(
        provenance::BRANCH.to_string(),
        repo.metadata.branch.clone().unwrap_or_default(),
      );
      vars.insert(
        provenance::COMMIT.to_string(),
        repo.metadata.commit.clone().unwrap_or_default(),
      );
    }

    Ok(vars)
  }

  /// A shell invocation using the configured shell.
  pub fn shell(&self, script: &str) -> ProcessSpec {
    ProcessSpec::shell(script, self.config.shell.as_deref())
  }

  /// Run a process, applying the configured timeout unless it sets its own.
  ///
  /// Captured output is logged at `info` in verbose runs and at `debug` otherwise.
  pub fn run(&self, spec: ProcessSpec) -> Result<ProcessOutput, ProcessError> {
    let spec = match spec.timeout {
      Some(_) => spec,
      None => spec.timeout(self.config.command_timeout),
    };
    let command = spec.display();
    let output = spec.run()?;

    if self.verbose {
      info!(target = %self.target.key, %command, stdout = %output.stdout, stderr = %output.stderr, "command output");
    } else {
      debug!(target = %self.target.key, %command, stdout = %output.stdout, stderr = %output.stderr, "command output");
    }
    Ok(output)
  }
}
