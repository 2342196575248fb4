//! Implementation of the `pb targets` command.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use serde::Serialize;

use polybuild_lib::graph::{Target, TargetKey};
use polybuild_lib::resolve::{ReferenceResolver, SearchPaths};

use super::{current_dir, describe, local_overrides_enabled, new_graph, parse_locator};
use crate::output::{self, OutputFormat};

#[derive(Serialize)]
struct TargetEntry<'a> {
  key: &'a TargetKey,
  kind: Option<String>,
  default: bool,
  deps: Vec<&'a TargetKey>,
}

/// List every target loaded for a locator.
///
/// Targets of referenced repositories are listed too. The repository's
/// default targets are marked.
pub fn cmd_targets(locator: Option<&str>, format: OutputFormat) -> Result<()> {
  let locator = parse_locator(locator)?;
  let current = current_dir()?;

  let mut graph = new_graph(ReferenceResolver::new(SearchPaths::from_env(), local_overrides_enabled()));
  let defaults: BTreeSet<TargetKey> = graph
    .load_locator(&locator, &current)
    .with_context(|| format!("Failed to load '{}'", describe(&locator)))?
    .into_iter()
    .collect();

  let entries: Vec<TargetEntry> = graph.targets().map(|t| entry(t, &defaults)).collect();

  if format.is_json() {
    return output::emit_json(&entries);
  }

  for repo in graph.repositories() {
    output::heading(&format!("{} ({})", repo.uri, repo.root().display()));
    for entry in entries.iter().filter(|e| e.key.repository == repo.uri) {
      let marker = if entry.default { "*" } else { " " };
      let kind = entry.kind.as_deref().unwrap_or("aggregate");
      println!("  {} {} [{}]", marker, entry.key.name, kind);
      for dep in &entry.deps {
        output::edge(3, &dep.to_string());
      }
    }
  }
  output::field("Targets", &entries.len().to_string());

  Ok(())
}

fn entry<'a>(target: &'a Target, defaults: &BTreeSet<TargetKey>) -> TargetEntry<'a> {
  TargetEntry {
    key: &target.key,
    kind: target.kind.map(|k| k.to_string()),
    default: defaults.contains(&target.key),
    deps: target.deps.iter().map(|d| &d.key).collect(),
  }
}
