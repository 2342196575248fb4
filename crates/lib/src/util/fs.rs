//! Filesystem helpers.

use std::fs;
use std::io;
use std::path::Path;

/// Point `link` at `target`, replacing whatever `link` currently is.
///
/// A stale symlink or file at `link` is removed first. A real directory at
/// `link` is left alone and reported as [`io::ErrorKind::AlreadyExists`].
pub fn replace_symlink(target: &Path, link: &Path) -> io::Result<()> {
  if let Some(parent) = link.parent() {
    fs::create_dir_all(parent)?;
  }

  match fs::symlink_metadata(link) {
    Ok(meta) if meta.file_type().is_symlink() || meta.is_file() => remove_link(link)?,
    Ok(_) => {
      return Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("'{}' is a directory", link.display()),
      ));
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => return Err(e),
  }

  create_link(target, link)
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_link(target: &Path, link: &Path) -> io::Result<()> {
  if target.is_dir() {
    std::os::windows::fs::symlink_dir(target, link)
  } else {
    std::os::windows::fs::symlink_file(target, link)
  }
}

#[cfg(unix)]
fn remove_link(link: &Path) -> io::Result<()> {
  fs::remove_file(link)
}

#[cfg(windows)]
fn remove_link(link: &Path) -> io::Result<()> {
  // Directory symlinks are removed as directories on Windows.
  fs::remove_file(link).or_else(|_| fs::remove_dir(link))
}

/// Remove a directory tree if it exists.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
  match fs::remove_dir_all(path) {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(e),
  }
}
