//! Loading repositories and targets into a [`TargetGraph`].
//!
//! # Algorithm Overview
//!
//! 1. [`TargetGraph::load`] registers a repository (once per uri), rejecting a
//!    second physical source for a uri that is already loaded
//! 2. The requested targets (or all declared targets) are loaded one by one
//! 3. Loading a target pushes its key onto a trace stack; finding it already
//!    on the stack is a load-time cycle
//! 4. The node is inserted before its dependencies are resolved, then every
//!    edge is resolved eagerly: same-repository edges recurse directly,
//!    reference edges run the reference's finder chain and load the
//!    referenced repository first
//! 5. If anything fails, every repository and target added by the call is
//!    removed again

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, info};

use super::error::GraphError;
use super::trace::Trace;
use super::types::{Dependency, Repository, RepositoryMetadata, Target, TargetKey};
use crate::locator::{DependencyRef, Locator};
use crate::resolve::ReferenceResolver;
use crate::spec::provider::canonical;
use crate::spec::{JsonSpecProvider, SpecProvider};

/// Options for [`TargetGraph::load`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
  /// Logical uri. Defaults to the specification's `uri`, then to the source path.
  pub uri: Option<String>,
  /// Targets to load. Empty loads every declared target.
  pub targets: Vec<String>,
  pub branch: Option<String>,
  pub commit: Option<String>,
}

impl LoadOptions {
  pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
    self.uri = Some(uri.into());
    self
  }

  pub fn with_targets<I, S>(mut self, targets: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.targets = targets.into_iter().map(Into::into).collect();
    self
  }
}

/// A flat, keyed set of targets and the repositories that own them.
pub struct TargetGraph {
  provider: Box<dyn SpecProvider>,
  resolver: ReferenceResolver,
  repositories: BTreeMap<String, Repository>,
  targets: BTreeMap<TargetKey, Target>,
}

impl Default for TargetGraph {
  fn default() -> Self {
    Self::new(Box::new(JsonSpecProvider), ReferenceResolver::default())
  }
}

impl TargetGraph {
  pub fn new(provider: Box<dyn SpecProvider>, resolver: ReferenceResolver) -> Self {
    Self {
      provider,
      resolver,
      repositories: BTreeMap::new(),
      targets: BTreeMap::new(),
    }
  }

  pub fn target(&self, key: &TargetKey) -> Option<&Target> {
    self.targets.get(key)
  }

  pub fn repository(&self, uri: &str) -> Option<&Repository> {
    self.repositories.get(uri)
  }

  pub fn targets(&self) -> impl Iterator<Item = &Target> {
    self.targets.values()
  }

  pub fn repositories(&self) -> impl Iterator<Item = &Repository> {
    self.repositories.values()
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  /// Insert a pre-resolved target without load-time checks.
  ///
  /// For hosts that assemble graphs themselves. The owning repository must
  /// already be loaded or inserted with [`insert_repository`](Self::insert_repository).
  pub fn insert(&mut self, target: Target) -> Result<(), GraphError> {
    if !self.repositories.contains_key(&target.key.repository) {
      return Err(GraphError::RepositoryNotLoaded(target.key.repository.clone()));
    }
    self.targets.insert(target.key.clone(), target);
    Ok(())
  }

  /// Register a repository without loading any of its targets.
  pub fn insert_repository(&mut self, repository: Repository) -> Result<(), GraphError> {
    self.check_source(&repository.uri, &repository.source)?;
    self.repositories.entry(repository.uri.clone()).or_insert(repository);
    Ok(())
  }

  /// Load a repository and the requested targets.
  ///
  /// Returns the keys of the requested targets (all declared targets when
  /// `options.targets` is empty). On error nothing loaded by this call is kept.
  pub fn load(&mut self, source: impl AsRef<Path>, options: LoadOptions) -> Result<Vec<TargetKey>, GraphError> {
    let repos_before: BTreeSet<String> = self.repositories.keys().cloned().collect();
    let targets_before: BTreeSet<TargetKey> = self.targets.keys().cloned().collect();

    let mut trace = Trace::default();
    let result = self
      .register(source.as_ref(), &options)
      .and_then(|uri| self.resolve(&uri, &options.targets, &mut trace));

    if result.is_err() {
      self.rollback(&repos_before, &targets_before);
    }

    result
  }

  /// Load the repository named by a locator.
  ///
  /// An empty repository part means `current`. Without a `::target`, every
  /// declared target is loaded and the repository's default targets are
  /// returned (all targets when it declares none).
  pub fn load_locator(&mut self, locator: &Locator, current: &Path) -> Result<Vec<TargetKey>, GraphError> {
    let source = if locator.is_current() {
      current.to_path_buf()
    } else {
      current.join(&locator.repository)
    };

    let options = LoadOptions {
      uri: None,
      targets: locator.target.iter().cloned().collect(),
      branch: locator.branch().map(str::to_string),
      commit: locator.commit().map(str::to_string),
    };

    let keys = self.load(&source, options)?;
    if locator.target.is_some() {
      return Ok(keys);
    }

    let Some(uri) = keys.first().map(|k| k.repository.clone()) else {
      return Ok(keys);
    };
    let defaults: Vec<TargetKey> = self
      .repositories
      .get(&uri)
      .map(|repo| {
        repo
          .spec
          .default_targets
          .iter()
          .map(|name| TargetKey::new(uri.clone(), name.clone()))
          .collect()
      })
      .unwrap_or_default();

    Ok(if defaults.is_empty() { keys } else { defaults })
  }

  /// Register a repository, returning its uri.
  fn register(&mut self, source: &Path, options: &LoadOptions) -> Result<String, GraphError> {
    let source = canonical(source);

    if let Some(uri) = &options.uri
      && self.repositories.contains_key(uri)
    {
      self.check_source(uri, &source)?;
      debug!(uri, "repository already loaded");
      return Ok(uri.clone());
    }

    let spec = self.provider.load(&source).map_err(|e| GraphError::Spec {
      source_path: source.clone(),
      source: e,
    })?;

    let uri = options
      .uri
      .clone()
      .or_else(|| spec.uri.clone())
      .unwrap_or_else(|| source.display().to_string());

    if self.repositories.contains_key(&uri) {
      self.check_source(&uri, &source)?;
      debug!(uri, "repository already loaded");
      return Ok(uri);
    }

    info!(uri, source = %source.display(), targets = spec.targets.len(), "loaded repository");

    let metadata = RepositoryMetadata {
      branch: options.branch.clone(),
      commit: options.commit.clone(),
      message: None,
    };
    self
      .repositories
      .insert(uri.clone(), Repository::new(uri.clone(), source, metadata, spec));
    Ok(uri)
  }

  fn check_source(&self, uri: &str, requested: &Path) -> Result<(), GraphError> {
    match self.repositories.get(uri) {
      Some(repo) if repo.source != requested => Err(GraphError::Conflict {
        uri: uri.to_string(),
        cached: repo.source.clone(),
        requested: requested.to_path_buf(),
      }),
      _ => Ok(()),
    }
  }

  /// Load the named targets of a registered repository, or all of them.
  fn resolve(&mut self, uri: &str, names: &[String], trace: &mut Trace) -> Result<Vec<TargetKey>, GraphError> {
    let repo = self
      .repositories
      .get(uri)
      .ok_or_else(|| GraphError::RepositoryNotLoaded(uri.to_string()))?;

    let names: Vec<String> = if names.is_empty() {
      repo.spec.target_names().map(str::to_string).collect()
    } else {
      names.to_vec()
    };

    let mut keys = Vec::with_capacity(names.len());
    for name in names {
      if repo_declares(self.repositories.get(uri), &name) {
        keys.push(self.load_target(uri, &name, trace)?);
      } else {
        return Err(GraphError::TargetNotFound {
          repository: uri.to_string(),
          name,
        });
      }
    }

    Ok(keys)
  }

  fn load_target(&mut self, uri: &str, name: &str, trace: &mut Trace) -> Result<TargetKey, GraphError> {
    let key = TargetKey::new(uri, name);

    trace.enter(&key).map_err(|chain| GraphError::Cycle { chain })?;

    if self.targets.contains_key(&key) {
      trace.leave(&key);
      return Ok(key);
    }

    let repo = self
      .repositories
      .get(uri)
      .ok_or_else(|| GraphError::RepositoryNotLoaded(uri.to_string()))?;
    let spec = repo.spec.target(name).cloned().ok_or_else(|| GraphError::TargetNotFound {
      repository: uri.to_string(),
      name: name.to_string(),
    })?;

    let mut target = Target::new(key.clone(), repo.root(), spec.kind);
    target.path = match &spec.path {
      Some(path) => repo.root().join(path),
      None if !target.package().is_empty() => repo.root().join(target.package()),
      None => repo.root().to_path_buf(),
    };
    target.packages = spec.packages.clone();
    target.spec = spec.spec.clone();
    let package = target.package().to_string();

    debug!(target = %key, kind = ?spec.kind, deps = spec.deps.len(), "loading target");

    // Insert before recursing so later edges find the in-progress node.
    self.targets.insert(key.clone(), target);

    for dep_spec in &spec.deps {
      let reference = dep_spec.target();
      let dep_ref = DependencyRef::parse(reference).map_err(|source| GraphError::InvalidDependency {
        from: key.clone(),
        source,
      })?;
      let dep_name = dep_ref.qualified_name(&package);

      let dep_key = match &dep_ref {
        DependencyRef::External { reference: ref_name, .. } => {
          self.resolve_cross_repo_dependency(&key, reference, ref_name, &dep_name, trace)?
        }
        _ => {
          if !repo_declares(self.repositories.get(uri), &dep_name) {
            return Err(GraphError::DependencyNotFound {
              from: key.clone(),
              reference: reference.to_string(),
              missing: TargetKey::new(uri, dep_name),
            });
          }
          self.load_target(uri, &dep_name, trace)?
        }
      };

      if let Some(target) = self.targets.get_mut(&key) {
        target.deps.push(Dependency {
          name: reference.to_string(),
          key: dep_key,
          build: dep_spec.build(),
        });
      }
    }

    trace.leave(&key);
    Ok(key)
  }

  fn resolve_cross_repo_dependency(
    &mut self,
    from: &TargetKey,
    reference_text: &str,
    reference_name: &str,
    target_name: &str,
    trace: &mut Trace,
  ) -> Result<TargetKey, GraphError> {
    let repo = self
      .repositories
      .get(&from.repository)
      .ok_or_else(|| GraphError::RepositoryNotLoaded(from.repository.clone()))?;

    let dep_uri = match repo.resolved_reference(reference_name) {
      Some(uri) => uri.to_string(),
      None => {
        let reference = repo
          .spec
          .reference(reference_name)
          .cloned()
          .ok_or_else(|| GraphError::ReferenceNotFound {
            from: from.clone(),
            reference: reference_name.to_string(),
          })?;

        let uri = reference.remote.clone();
        if self.repositories.contains_key(&uri) {
          // A local override must be the checkout that is already loaded.
          if let Some(path) = self.resolver.find_local(reference_name, &reference) {
            self.check_source(&uri, &canonical(&path))?;
          }
        } else {
          let path = self
            .resolver
            .resolve(reference_name, &reference)
            .map_err(|source| GraphError::Unsupported {
              from: from.clone(),
              source,
            })?;
          self.register(&path, &LoadOptions::default().with_uri(uri.clone()))?;
        }

        if let Some(repo) = self.repositories.get_mut(&from.repository) {
          repo.references.insert(reference_name.to_string(), uri.clone());
        }
        uri
      }
    };

    debug!(from = %from, reference = reference_name, uri = %dep_uri, "resolved reference");

    if !repo_declares(self.repositories.get(&dep_uri), target_name) {
      return Err(GraphError::DependencyNotFound {
        from: from.clone(),
        reference: reference_text.to_string(),
        missing: TargetKey::new(dep_uri, target_name),
      });
    }

    self.load_target(&dep_uri, target_name, trace)
  }

  fn rollback(&mut self, repos_before: &BTreeSet<String>, targets_before: &BTreeSet<TargetKey>) {
    self.repositories.retain(|uri, _| repos_before.contains(uri));
    self.targets.retain(|key, _| targets_before.contains(key));

    let loaded: BTreeSet<String> = self.repositories.keys().cloned().collect();
    for repo in self.repositories.values_mut() {
      repo.references.retain(|_, uri| loaded.contains(uri));
    }
  }
}

fn repo_declares(repo: Option<&Repository>, name: &str) -> bool {
  repo.is_some_and(|r| r.spec.target(name).is_some())
}
