//! Finder strategies.
//!
//! A finder looks for a local copy of a referenced repository without
//! contacting any remote. Two strategies exist:
//!
//! - [`ModuleFinder`] - look a dotted module name up on the module search path
//!   (the `PYTHONPATH` convention)
//! - [`PackageFinder`] - look a package path up under package roots
//!   (the `GOPATH/src` convention)
//!
//! Both then step up `strip` parent directories from the location they found,
//! so a module that lives inside a repository can point at the repository root.
//! Not finding anything is `Ok(None)`, never an error.

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

use crate::spec::FinderSpec;

/// Errors a finder can report. These are tolerated by the resolver.
#[derive(Debug, Error)]
pub enum FindError {
  /// The module or package name was empty or malformed.
  #[error("invalid name '{name}': {reason}")]
  InvalidName { name: String, reason: &'static str },

  /// Stripping parents walked past the filesystem root.
  #[error("cannot strip {strip} parent(s) from '{path}'")]
  StripTooFar { path: PathBuf, strip: usize },
}

/// A local-override strategy.
pub trait Finder {
  /// Short description for logs.
  fn describe(&self) -> String;

  /// Look for a local path.
  fn find(&self) -> Result<Option<PathBuf>, FindError>;
}

/// Where finders look.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPaths {
  /// Directories searched by [`ModuleFinder`], in order.
  pub module_path: Vec<PathBuf>,
  /// Directories searched by [`PackageFinder`], in order.
  pub package_roots: Vec<PathBuf>,
}

impl SearchPaths {
  /// Build search paths from `PYTHONPATH` and `GOPATH`.
  ///
  /// Every `GOPATH` entry contributes its `src` directory.
  pub fn from_env() -> Self {
    let module_path = env::var_os("PYTHONPATH")
      .map(|v| env::split_paths(&v).filter(|p| !p.as_os_str().is_empty()).collect())
      .unwrap_or_default();

    let package_roots = env::var_os("GOPATH")
      .map(|v| {
        env::split_paths(&v)
          .filter(|p| !p.as_os_str().is_empty())
          .map(|p| p.join("src"))
          .collect()
      })
      .unwrap_or_default();

    Self {
      module_path,
      package_roots,
    }
  }

  /// Instantiate the finder described by `spec` over these search paths.
  pub fn finder(&self, spec: &FinderSpec) -> Box<dyn Finder> {
    match spec {
      FinderSpec::Module { module, strip } => Box::new(ModuleFinder {
        module: module.clone(),
        strip: *strip,
        search_path: self.module_path.clone(),
      }),
      FinderSpec::Package { package, strip } => Box::new(PackageFinder {
        package: package.clone(),
        strip: *strip,
        roots: self.package_roots.clone(),
      }),
    }
  }
}

/// Finds a module on a search path.
///
/// `a.b.c` matches the directory `<dir>/a/b/c` or the file `<dir>/a/b/c.py`.
#[derive(Debug, Clone)]
pub struct ModuleFinder {
  pub module: String,
  pub strip: usize,
  pub search_path: Vec<PathBuf>,
}

impl Finder for ModuleFinder {
  fn describe(&self) -> String {
    format!("module:{}", self.module)
  }

  fn find(&self) -> Result<Option<PathBuf>, FindError> {
    if self.module.is_empty() || self.module.split('.').any(|part| part.is_empty()) {
      return Err(FindError::InvalidName {
        name: self.module.clone(),
        reason: "empty module component",
      });
    }

    let relative: PathBuf = self.module.split('.').collect();

    for dir in &self.search_path {
      let candidate = dir.join(&relative);
      trace!(candidate = %candidate.display(), "probing module location");

      if candidate.is_dir() {
        return strip_parents(&candidate, self.strip).map(Some);
      }

      let file = candidate.with_extension("py");
      if file.is_file() {
        return strip_parents(&file, self.strip).map(Some);
      }
    }

    Ok(None)
  }
}

/// Finds a package path under a set of roots.
#[derive(Debug, Clone)]
pub struct PackageFinder {
  pub package: String,
  pub strip: usize,
  pub roots: Vec<PathBuf>,
}

impl Finder for PackageFinder {
  fn describe(&self) -> String {
    format!("package:{}", self.package)
  }

  fn find(&self) -> Result<Option<PathBuf>, FindError> {
    let package = self.package.trim_matches('/');
    if package.is_empty() {
      return Err(FindError::InvalidName {
        name: self.package.clone(),
        reason: "empty package path",
      });
    }
    if package.split('/').any(|part| part == "..") {
      return Err(FindError::InvalidName {
        name: self.package.clone(),
        reason: "package path escapes its root",
      });
    }

    for root in &self.roots {
      let candidate = root.join(package);
      trace!(candidate = %candidate.display(), "probing package location");

      if candidate.exists() {
        return strip_parents(&candidate, self.strip).map(Some);
      }
    }

    Ok(None)
  }
}

/// Apply `parent()` to `path` `strip` times.
fn strip_parents(path: &Path, strip: usize) -> Result<PathBuf, FindError> {
  let mut current = path;
  for _ in 0..strip {
    current = current.parent().ok_or_else(|| FindError::StripTooFar {
      path: path.to_path_buf(),
      strip,
    })?;
  }
  Ok(current.to_path_buf())
}
