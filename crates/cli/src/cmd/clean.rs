//! Implementation of the `pb clean` command.

use std::path::{Component, Path};

use anyhow::{Context, Result, bail};

use polybuild_lib::build::output::{clean, clean_all};
use polybuild_lib::platform::paths;

use crate::output;

/// Remove one run's namespace, or every run when no tag is given.
pub fn cmd_clean(tag: Option<&str>) -> Result<()> {
  let root = paths::build_root();

  match tag {
    Some(tag) => {
      if !is_single_component(tag) {
        bail!("Invalid build tag '{}'", tag);
      }
      let namespace = root.join(tag);
      let removed = clean(&namespace).with_context(|| format!("Failed to remove '{}'", namespace.display()))?;
      if removed {
        output::done(&format!("Removed build {}", tag));
      } else {
        output::heading(&format!("No build {} under {}", tag, root.display()));
      }
    }
    None => {
      let count = clean_all(&root).with_context(|| format!("Failed to clean '{}'", root.display()))?;
      output::done("Clean complete!");
      output::field("Builds removed", &count.to_string());
      output::field("Build root", &root.display().to_string());
    }
  }

  Ok(())
}

fn is_single_component(tag: &str) -> bool {
  let mut components = Path::new(tag).components();
  matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}
