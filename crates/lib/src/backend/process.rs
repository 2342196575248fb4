//! External process execution.
//!
//! Every compiler, package manager and image daemon call made during a build
//! goes through [`ProcessSpec`]. Each call is bounded by its own timeout; a
//! child that outlives it is killed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors from running an external process.
#[derive(Debug, Error)]
pub enum ProcessError {
  #[error("failed to spawn '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("'{command}' timed out after {timeout:?}")]
  Timeout { command: String, timeout: Duration },

  #[error("'{command}' failed with exit code {code:?}: {stderr}")]
  Failed {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("failed to start process runtime: {0}")]
  Runtime(#[source] std::io::Error),
}

/// Captured output of a successful process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
  pub stdout: String,
  pub stderr: String,
}

/// A process invocation.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: Option<PathBuf>,
  /// Added to the inherited environment.
  pub env: BTreeMap<String, String>,
  pub timeout: Option<Duration>,
}

impl ProcessSpec {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      ..Default::default()
    }
  }

  /// Build a spec from an argv list. `None` if the list is empty.
  pub fn from_argv<I, S>(argv: I) -> Option<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut argv = argv.into_iter().map(Into::into);
    let program = argv.next()?;
    Some(Self::new(program).args(argv))
  }

  /// Run `script` through a shell.
  ///
  /// Uses `shell` when given, otherwise `/bin/sh` (Unix) or `cmd.exe` (Windows).
  pub fn shell(script: &str, shell: Option<&str>) -> Self {
    let (program, flag) = shell_program(shell);
    Self::new(program).arg(flag).arg(script)
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
    self.cwd = Some(cwd.into());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn envs<I, K, V>(mut self, vars: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    self
      .env
      .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
    self
  }

  pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  /// The command line, for messages.
  pub fn display(&self) -> String {
    std::iter::once(self.program.as_str())
      .chain(self.args.iter().map(String::as_str))
      .collect::<Vec<_>>()
      .join(" ")
  }

  /// Run to completion on a private single-threaded runtime.
  ///
  /// Must not be called from inside an async context.
  pub fn run(&self) -> Result<ProcessOutput, ProcessError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .map_err(ProcessError::Runtime)?;
    runtime.block_on(self.output())
  }

  /// Run to completion, returning captured output.
  pub async fn output(&self) -> Result<ProcessOutput, ProcessError> {
    let command_line = self.display();
    info!(command = %command_line, "running");

    let mut command = Command::new(&self.program);
    command
      .args(&self.args)
      .envs(&self.env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(cwd) = &self.cwd {
      command.current_dir(cwd);
    }

    debug!(program = %self.program, cwd = ?self.cwd, timeout = ?self.timeout, "spawning process");

    let child = command.spawn().map_err(|source| ProcessError::Spawn {
      program: self.program.clone(),
      source,
    })?;

    let waited = match self.timeout {
      // Dropping the future drops the child, which kills it.
      Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ProcessError::Timeout {
          command: command_line.clone(),
          timeout,
        })?,
      None => child.wait_with_output().await,
    };
    let output = waited.map_err(|source| ProcessError::Spawn {
      program: self.program.clone(),
      source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "command stdout");
      }
      return Err(ProcessError::Failed {
        command: command_line,
        code: output.status.code(),
        stderr,
      });
    }

    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command output");
    }

    Ok(ProcessOutput { stdout, stderr })
  }
}

fn shell_program(shell: Option<&str>) -> (String, &'static str) {
  if let Some(shell) = shell {
    let flag = if shell.contains("cmd") { "/C" } else { "-c" };
    return (shell.to_string(), flag);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), "-c")
  }

  #[cfg(windows)]
  {
    ("cmd.exe".to_string(), "/C")
  }
}
