//! Implementation of the `pb build` command.
//!
//! Loads the repository named by a locator, builds the requested targets (or
//! the repository's default targets) with one orchestrator run, and reports
//! the artifacts produced.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use polybuild_lib::backend::Registry;
use polybuild_lib::build::{BuildConfig, BuildOptions, BuildResult, Orchestrator};
use polybuild_lib::resolve::ReferenceResolver;
use polybuild_lib::spec::PackageKind;

use super::{current_dir, describe, local_overrides_enabled, new_graph, parse_locator};
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct BuildArgs {
  /// Target locator: <repository>[///@branch|///=commit][::target]
  locator: Option<String>,

  /// Link the root's file artifacts into this directory
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// Build only the root, not its dependencies
  #[arg(long)]
  no_deps: bool,

  /// Build the dependencies but not the root itself
  #[arg(long)]
  deps_only: bool,

  /// Do not install packages of this kind (repeatable)
  #[arg(long, value_name = "KIND")]
  skip_packages: Vec<PackageKind>,

  /// Continue when installing packages of this kind fails (repeatable)
  #[arg(long, value_name = "KIND")]
  ignore_install_errors: Vec<PackageKind>,

  /// Pass the installers' update arguments
  #[arg(short, long)]
  update: bool,

  /// Bound on each external command, e.g. "90s" or "5m"
  #[arg(long, value_parser = humantime::parse_duration)]
  timeout: Option<Duration>,

  /// Container image client
  #[arg(long)]
  container_cli: Option<String>,

  /// Output format
  #[arg(long, value_enum, default_value_t)]
  format: OutputFormat,
}

impl BuildArgs {
  fn options(&self, verbose: bool) -> BuildOptions {
    BuildOptions {
      build_dependencies: !self.no_deps,
      skip_packages: self.skip_packages.iter().copied().collect::<BTreeSet<_>>(),
      force_update: self.update,
      skip_root: self.deps_only,
      ignore_install_errors: self.ignore_install_errors.iter().copied().collect(),
      output_dir: self.output.clone(),
      verbose,
    }
  }

  fn config(&self) -> BuildConfig {
    let mut config = BuildConfig {
      local_overrides: local_overrides_enabled(),
      ..BuildConfig::default()
    };
    if let Some(timeout) = self.timeout {
      config.command_timeout = Some(timeout);
    }
    if let Some(cli) = &self.container_cli {
      config.container_cli = cli.clone();
    }
    config
  }
}

#[derive(Serialize)]
struct BuildSummary<'a> {
  tag: String,
  namespace: PathBuf,
  roots: Vec<&'a BuildResult>,
  built: usize,
  outputs: Vec<&'a PathBuf>,
  duration_ms: u128,
}

/// Execute the build command.
pub fn cmd_build(args: BuildArgs, verbose: bool) -> Result<()> {
  let start = Instant::now();

  let locator = parse_locator(args.locator.as_deref())?;
  let current = current_dir()?;
  let config = args.config();

  let mut graph = new_graph(ReferenceResolver::new(
    config.search_paths.clone(),
    config.local_overrides,
  ));
  let roots = graph
    .load_locator(&locator, &current)
    .with_context(|| format!("Failed to load '{}'", describe(&locator)))?;
  info!(locator = %describe(&locator), roots = roots.len(), targets = graph.len(), "graph loaded");

  let mut orchestrator = Orchestrator::new(&graph, Registry::standard(), config, args.options(verbose));
  let outputs = orchestrator.build_all(&roots).context("Build failed")?;

  let built = orchestrator.results().len();
  let root_results: Vec<&BuildResult> = outputs.iter().filter_map(|o| o.root.as_deref()).collect();
  let links: Vec<&PathBuf> = outputs.iter().flat_map(|o| o.outputs.iter()).collect();

  if args.format.is_json() {
    output::emit_json(&BuildSummary {
      tag: orchestrator.tag().to_string(),
      namespace: orchestrator.namespace().to_path_buf(),
      roots: root_results,
      built,
      outputs: links,
      duration_ms: start.elapsed().as_millis(),
    })?;
    return Ok(());
  }

  println!();
  output::done("Build complete!");
  output::field("Tag", &orchestrator.tag().to_string());
  output::field("Targets built", &built.to_string());
  output::field("Outputs", &orchestrator.namespace().display().to_string());
  for result in &root_results {
    print_root(result);
  }
  if args.deps_only {
    output::heading("Root targets skipped");
  }
  for link in &links {
    output::field("Linked", &link.display().to_string());
  }
  output::field("Duration", &output::elapsed(start.elapsed()));

  Ok(())
}

fn print_root(result: &BuildResult) {
  output::heading(&format!("{} ({})", result.key, output::elapsed(result.duration)));
  for artifact in &result.artifacts {
    output::edge(2, &output::artifact_line(artifact));
  }
}
