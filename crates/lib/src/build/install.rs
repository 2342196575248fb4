//! Auxiliary package installs.
//!
//! Targets may declare language packages (`packages: {"pip": [...]}`) that are
//! not targets themselves. Each package is installed at most once per run
//! into `<namespace>/packages/<kind>`, no matter how many targets ask for it.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{BuildConfig, BuildOptions};
use crate::backend::process::{ProcessError, ProcessSpec};
use crate::spec::PackageKind;

/// Environment variable holding the install root, set for every installer.
pub const INSTALL_ROOT_ENV: &str = "PB_INSTALL_ROOT";

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("no installer configured for {0} packages")]
  NoInstaller(PackageKind),

  #[error("installer command for {0} packages is empty")]
  EmptyCommand(PackageKind),

  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error("failed to create install root: {0}")]
  Io(#[from] std::io::Error),
}

/// Packages installed so far in one run.
#[derive(Debug, Default)]
pub struct InstallCache {
  installed: BTreeSet<(PackageKind, String)>,
}

impl InstallCache {
  pub fn is_installed(&self, kind: PackageKind, package: &str) -> bool {
    self.installed.contains(&(kind, package.to_string()))
  }

  pub fn len(&self) -> usize {
    self.installed.len()
  }

  pub fn is_empty(&self) -> bool {
    self.installed.is_empty()
  }

  /// Install `package` unless it already was installed this run.
  ///
  /// With `kind` in `options.ignore_install_errors`, a failed install is
  /// logged and recorded as done. Returns whether an installer ran.
  pub fn ensure(
    &mut self,
    kind: PackageKind,
    package: &str,
    namespace: &Path,
    config: &BuildConfig,
    options: &BuildOptions,
  ) -> Result<bool, InstallError> {
    if self.is_installed(kind, package) {
      debug!(%kind, package, "already installed");
      return Ok(false);
    }

    match install(kind, package, namespace, config, options) {
      Ok(()) => {}
      Err(e) if options.ignore_install_errors.contains(&kind) => {
        warn!(%kind, package, error = %e, "install failed, ignoring");
      }
      Err(e) => return Err(e),
    }

    self.installed.insert((kind, package.to_string()));
    Ok(true)
  }
}

fn install(
  kind: PackageKind,
  package: &str,
  namespace: &Path,
  config: &BuildConfig,
  options: &BuildOptions,
) -> Result<(), InstallError> {
  let installer = config.installers.get(&kind).ok_or(InstallError::NoInstaller(kind))?;
  let root = namespace.join("packages").join(kind.as_str());
  fs::create_dir_all(&root)?;
  let root_str = root.display().to_string();

  let mut process = ProcessSpec::from_argv(installer.command.iter().cloned())
    .ok_or(InstallError::EmptyCommand(kind))?
    .env(INSTALL_ROOT_ENV, root_str.clone())
    .timeout(config.command_timeout);

  if options.force_update {
    process = process.args(installer.update_args.iter().cloned());
  }
  if let Some(flag) = &installer.root_arg {
    process = process.arg(flag.clone()).arg(root_str.clone());
  }
  if let Some(var) = &installer.root_env {
    process = process.env(var.clone(), root_str);
  }

  info!(%kind, package, "installing package");
  process.arg(package).run()?;
  Ok(())
}
