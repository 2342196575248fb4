//! Reference resolution through finder chains.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::finder::SearchPaths;
use crate::spec::ReferenceSpec;

/// Errors that can occur while resolving a reference.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// No local override was found and fetching the remote is not implemented.
  #[error("reference '{reference}' requires fetching remote '{remote}', which is not supported")]
  RemoteFetchUnsupported { reference: String, remote: String },
}

/// Turns a named reference into a local repository path.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
  search_paths: SearchPaths,
  local_overrides: bool,
}

impl Default for ReferenceResolver {
  fn default() -> Self {
    Self::new(SearchPaths::from_env(), true)
  }
}

impl ReferenceResolver {
  /// Create a resolver.
  ///
  /// With `local_overrides` disabled, finder chains are never run.
  pub fn new(search_paths: SearchPaths, local_overrides: bool) -> Self {
    Self {
      search_paths,
      local_overrides,
    }
  }

  /// Run the reference's finder chain.
  ///
  /// Finders are tried in declaration order and the first hit wins; later
  /// finders are not run. A finder that fails is logged and skipped. Returns
  /// `None` without running anything when local overrides are disabled.
  pub fn find_local(&self, name: &str, reference: &ReferenceSpec) -> Option<PathBuf> {
    if !self.local_overrides {
      return None;
    }

    for spec in &reference.finders {
      let finder = self.search_paths.finder(spec);

      match finder.find() {
        Ok(Some(path)) => {
          info!(reference = name, finder = %finder.describe(), path = %path.display(), "found local override");
          return Some(path);
        }
        Ok(None) => {
          debug!(reference = name, finder = %finder.describe(), "finder found nothing");
        }
        Err(e) => {
          warn!(reference = name, finder = %finder.describe(), error = %e, "finder failed, trying next");
        }
      }
    }

    None
  }

  /// Resolve a reference to a local path.
  ///
  /// Falls back to the remote locator when no local override applies, which
  /// fails with [`ResolveError::RemoteFetchUnsupported`].
  pub fn resolve(&self, name: &str, reference: &ReferenceSpec) -> Result<PathBuf, ResolveError> {
    if let Some(path) = self.find_local(name, reference) {
      return Ok(path);
    }

    self.fetch_remote(name, reference)
  }

  fn fetch_remote(&self, name: &str, reference: &ReferenceSpec) -> Result<PathBuf, ResolveError> {
    Err(ResolveError::RemoteFetchUnsupported {
      reference: name.to_string(),
      remote: reference.remote.clone(),
    })
  }
}
