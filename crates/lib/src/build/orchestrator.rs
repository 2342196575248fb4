//! The build run state machine.
//!
//! # Algorithm Overview
//!
//! One [`Orchestrator`] is one run: it mints a [`BuildTag`] and owns every
//! cache of the run. Building a root takes three steps:
//!
//! 1. **Prepare** (pre-order, every edge): create each kind's environment
//!    once and let the backend link the target into it
//! 2. **Build** (post-order, `build = true` edges only): install the
//!    target's auxiliary packages, then dispatch to its backend. A target with
//!    a result is never built again; a target reached while it is still being
//!    built is a cycle
//! 3. **Materialize**: link the root's file artifacts into the output directory
//!
//! The first error aborts the run.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use super::context::BuildContext;
use super::error::BuildError;
use super::install::InstallCache;
use super::output;
use super::types::{Artifact, BuildConfig, BuildOptions, BuildResult, BuildTag};
use crate::backend::{BackendError, BuildEnv, Registry};
use crate::graph::trace::Trace;
use crate::graph::{Dependency, Order, Target, TargetGraph, TargetKey, TargetVisitor};
use crate::spec::TargetKind;

/// What a call to [`Orchestrator::build`] produced.
#[derive(Debug, Clone)]
pub struct BuildOutput {
  pub tag: BuildTag,
  /// `None` when the root was skipped.
  pub root: Option<Arc<BuildResult>>,
  /// Every result of the run so far, including earlier roots.
  pub results: BTreeMap<TargetKey, Arc<BuildResult>>,
  /// Links created in the output directory.
  pub outputs: Vec<PathBuf>,
}

pub struct Orchestrator<'g> {
  graph: &'g TargetGraph,
  registry: Registry,
  config: BuildConfig,
  options: BuildOptions,
  tag: BuildTag,
  namespace: PathBuf,
  results: BTreeMap<TargetKey, Arc<BuildResult>>,
  building: Trace,
  prepared: HashSet<TargetKey>,
  linked: BTreeMap<TargetKey, PathBuf>,
  envs: BTreeMap<TargetKind, BuildEnv>,
  installs: InstallCache,
}

impl<'g> Orchestrator<'g> {
  pub fn new(graph: &'g TargetGraph, registry: Registry, config: BuildConfig, options: BuildOptions) -> Self {
    let tag = BuildTag::new();
    let namespace = config.build_root.join(tag.to_string());

    Self {
      graph,
      registry,
      config,
      options,
      tag,
      namespace,
      results: BTreeMap::new(),
      building: Trace::default(),
      prepared: HashSet::new(),
      linked: BTreeMap::new(),
      envs: BTreeMap::new(),
      installs: InstallCache::default(),
    }
  }

  pub fn tag(&self) -> BuildTag {
    self.tag
  }

  /// `<build_root>/<tag>`: everything this run writes lives here.
  pub fn namespace(&self) -> &Path {
    &self.namespace
  }

  pub fn result(&self, key: &TargetKey) -> Option<&Arc<BuildResult>> {
    self.results.get(key)
  }

  pub fn results(&self) -> &BTreeMap<TargetKey, Arc<BuildResult>> {
    &self.results
  }

  /// Build `root` and everything it transitively needs.
  pub fn build(&mut self, root: &TargetKey) -> Result<BuildOutput, BuildError> {
    let started = Instant::now();
    info!(tag = %self.tag, root = %root, "starting build");

    let graph = self.graph;
    graph.traverse(root, &mut Preparer { run: self }, Order::Pre)?;
    graph.traverse(root, &mut Builder { run: self, root }, Order::Post)?;

    let root_result = self.results.get(root).cloned();
    let mut outputs = Vec::new();
    if let (Some(dir), Some(result), Some(target)) = (&self.options.output_dir, &root_result, graph.target(root)) {
      outputs = output::materialize(result, target.name(), dir).map_err(|source| BuildError::Output {
        path: dir.clone(),
        source,
      })?;
    }

    info!(
      tag = %self.tag,
      root = %root,
      built = self.results.len(),
      elapsed = ?started.elapsed(),
      "build finished"
    );

    Ok(BuildOutput {
      tag: self.tag,
      root: root_result,
      results: self.results.clone(),
      outputs,
    })
  }

  /// Build several roots in this run. Shared dependencies are built once.
  pub fn build_all(&mut self, roots: &[TargetKey]) -> Result<Vec<BuildOutput>, BuildError> {
    roots.iter().map(|root| self.build(root)).collect()
  }

  /// Remove this run's namespace.
  pub fn clean(&self) -> Result<bool, BuildError> {
    output::clean(&self.namespace).map_err(|source| BuildError::Io {
      context: format!("removing '{}'", self.namespace.display()),
      source,
    })
  }

  fn context<'a>(
    &'a self,
    target: &'a Target,
    dependencies: &'a BTreeMap<String, Arc<BuildResult>>,
  ) -> BuildContext<'a> {
    BuildContext {
      graph: self.graph,
      target,
      tag: self.tag,
      build_time: Utc::now(),
      namespace: &self.namespace,
      config: &self.config,
      verbose: self.options.verbose,
      dependencies,
      env: target.kind.and_then(|kind| self.envs.get(&kind)),
      linked_path: self.linked.get(&target.key).map(PathBuf::as_path),
      output_path: Default::default(),
    }
  }

  fn ensure_env(&mut self, kind: TargetKind, key: &TargetKey) -> Result<(), BuildError> {
    if self.envs.contains_key(&kind) {
      return Ok(());
    }
    let Some(backend) = self.registry.get(kind) else {
      return Ok(());
    };

    let root = self.namespace.join(kind.as_str());
    let env = backend.create_env(&root).map_err(|source| BuildError::Target {
      key: key.clone(),
      source,
    })?;
    debug!(%kind, root = %env.root.display(), "created build environment");
    self.envs.insert(kind, env);
    Ok(())
  }

  fn prepare(&mut self, target: &Target) -> Result<(), BuildError> {
    if !self.prepared.insert(target.key.clone()) {
      return Ok(());
    }
    let Some(kind) = target.kind else {
      return Ok(());
    };
    self.ensure_env(kind, &target.key)?;

    let linked = {
      let (Some(backend), Some(env)) = (self.registry.get(kind), self.envs.get(&kind)) else {
        return Ok(());
      };
      let none = BTreeMap::new();
      let ctx = self.context(target, &none);
      backend.prepare(target, env, &ctx).map_err(|source| BuildError::Target {
        key: target.key.clone(),
        source,
      })?
    };

    if let Some(path) = linked {
      debug!(target = %target.key, linked = %path.display(), "prepared target");
      self.linked.insert(target.key.clone(), path);
    }
    Ok(())
  }

  fn install_packages(&mut self, target: &Target) -> Result<(), BuildError> {
    for (kind, packages) in &target.packages {
      if self.options.skip_packages.contains(kind) {
        debug!(target = %target.key, %kind, "skipping package installs");
        continue;
      }
      for package in packages {
        self
          .installs
          .ensure(*kind, package, &self.namespace, &self.config, &self.options)
          .map_err(|source| BuildError::DependencyInstall {
            key: target.key.clone(),
            kind: *kind,
            package: package.clone(),
            source,
          })?;
      }
    }
    Ok(())
  }

  fn build_target(&mut self, target: &Target) -> Result<(), BuildError> {
    self.install_packages(target)?;

    let dependencies: BTreeMap<String, Arc<BuildResult>> = target
      .deps
      .iter()
      .filter_map(|dep| self.results.get(&dep.key).map(|r| (dep.name.clone(), Arc::clone(r))))
      .collect();

    let started_at = Utc::now();
    let started = Instant::now();

    let (artifacts, output_path) = match target.kind {
      None => {
        debug!(target = %target.key, "aggregate target, nothing to run");
        (Vec::new(), None)
      }
      Some(kind) => {
        let backend = self.registry.get(kind).ok_or_else(|| BuildError::UnknownBuildKind {
          key: target.key.clone(),
          kind,
        })?;
        info!(target = %target.key, %kind, "building target");

        let ctx = self.context(target, &dependencies);
        let artifacts = backend
          .build(target, &ctx)
          .and_then(check_unique_names)
          .map_err(|source| BuildError::Target {
            key: target.key.clone(),
            source,
          })?;
        (artifacts, ctx.take_output_path())
      }
    };

    let result = BuildResult {
      key: target.key.clone(),
      tag: self.tag,
      started_at,
      duration: started.elapsed(),
      builder: target.kind,
      source_path: target.path.clone(),
      linked_path: self.linked.get(&target.key).cloned(),
      output_path,
      artifacts,
      dependencies,
    };

    info!(
      target = %target.key,
      artifacts = result.artifacts.len(),
      duration = ?result.duration,
      "built target"
    );
    self.results.insert(target.key.clone(), Arc::new(result));
    Ok(())
  }
}

fn check_unique_names(artifacts: Vec<Artifact>) -> Result<Vec<Artifact>, BackendError> {
  let mut seen = BTreeSet::new();
  for artifact in &artifacts {
    if !seen.insert(artifact.name()) {
      return Err(BackendError::DuplicateArtifact(artifact.name().to_string()));
    }
  }
  Ok(artifacts)
}

/// Pre-order pass: environments and linking.
struct Preparer<'a, 'g> {
  run: &'a mut Orchestrator<'g>,
}

impl TargetVisitor for Preparer<'_, '_> {
  type Error = BuildError;

  fn descend(&mut self, _from: &Target, dep: &Dependency) -> bool {
    !self.run.prepared.contains(&dep.key)
  }

  fn visit(&mut self, target: &Target) -> Result<(), BuildError> {
    self.run.prepare(target)
  }
}

/// Post-order pass: installs and backend dispatch.
struct Builder<'a, 'g> {
  run: &'a mut Orchestrator<'g>,
  root: &'a TargetKey,
}

impl TargetVisitor for Builder<'_, '_> {
  type Error = BuildError;

  fn enter(&mut self, target: &Target) -> Result<(), BuildError> {
    self
      .run
      .building
      .enter(&target.key)
      .map_err(|chain| BuildError::Cycle { chain })
  }

  fn descend(&mut self, from: &Target, dep: &Dependency) -> bool {
    if !self.run.options.build_dependencies || !dep.build {
      debug!(from = %from.key, to = %dep.key, build = dep.build, "not building dependency");
      return false;
    }
    !self.run.results.contains_key(&dep.key)
  }

  fn visit(&mut self, target: &Target) -> Result<(), BuildError> {
    if self.run.results.contains_key(&target.key) {
      return Ok(());
    }
    if self.run.options.skip_root && &target.key == self.root {
      info!(target = %target.key, "skipping root build");
      return Ok(());
    }
    self.run.build_target(target)
  }

  fn leave(&mut self, target: &Target) {
    self.run.building.leave(&target.key);
  }
}
