mod build;
mod clean;
mod targets;

use std::path::PathBuf;

use anyhow::{Context, Result};

use polybuild_lib::consts::NO_LOCAL_OVERRIDES_ENV;
use polybuild_lib::graph::TargetGraph;
use polybuild_lib::locator::Locator;
use polybuild_lib::resolve::ReferenceResolver;
use polybuild_lib::spec::JsonSpecProvider;

pub use build::{BuildArgs, cmd_build};
pub use clean::cmd_clean;
pub use targets::cmd_targets;

/// Parse a command line locator. No locator means the current repository.
fn parse_locator(raw: Option<&str>) -> Result<Locator> {
  match raw {
    Some(raw) => raw.parse().with_context(|| format!("Invalid locator '{}'", raw)),
    None => Ok(Locator {
      repository: String::new(),
      selector: None,
      target: None,
    }),
  }
}

fn current_dir() -> Result<PathBuf> {
  std::env::current_dir().context("Failed to determine current directory")
}

fn local_overrides_enabled() -> bool {
  std::env::var_os(NO_LOCAL_OVERRIDES_ENV).is_none()
}

/// A graph over `polybuild.json` files with the resolver configured from the environment.
fn new_graph(resolver: ReferenceResolver) -> TargetGraph {
  TargetGraph::new(Box::new(JsonSpecProvider), resolver)
}

fn describe(locator: &Locator) -> String {
  if locator.is_current() && locator.selector.is_none() && locator.target.is_none() {
    ".".to_string()
  } else {
    locator.to_string()
  }
}
