//! Output materialization and cleanup.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::{Artifact, BuildResult};
use crate::util::fs::{remove_dir_if_exists, replace_symlink};

/// Link every file artifact of `result` to `<output_dir>/<target_name>/<artifact name>`.
///
/// Existing links of the same name are replaced. Returns the created links.
pub fn materialize(result: &BuildResult, target_name: &str, output_dir: &Path) -> io::Result<Vec<PathBuf>> {
  let dir = output_dir.join(target_name);
  let mut links = Vec::new();

  for artifact in &result.artifacts {
    let Artifact::File { name, path, .. } = artifact else {
      continue;
    };
    let link = dir.join(name);
    replace_symlink(path, &link)?;
    debug!(artifact = %name, link = %link.display(), "linked artifact");
    links.push(link);
  }

  if !links.is_empty() {
    info!(target = %result.key, dir = %dir.display(), count = links.len(), "materialized outputs");
  }
  Ok(links)
}

/// Remove one run's namespace. Returns whether anything was removed.
pub fn clean(namespace: &Path) -> io::Result<bool> {
  let removed = remove_dir_if_exists(namespace)?;
  if removed {
    info!(namespace = %namespace.display(), "removed build namespace");
  }
  Ok(removed)
}

/// Remove every run under `build_root`. Returns how many runs were removed.
pub fn clean_all(build_root: &Path) -> io::Result<usize> {
  let entries = match std::fs::read_dir(build_root) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
    Err(e) => return Err(e),
  };

  let mut count = 0;
  for entry in entries {
    let entry = entry?;
    if entry.file_type()?.is_dir() {
      std::fs::remove_dir_all(entry.path())?;
      count += 1;
    }
  }

  info!(root = %build_root.display(), runs = count, "cleaned build root");
  Ok(count)
}
