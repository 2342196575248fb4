//! Depth-first traversal of a loaded graph.
//!
//! A [`TargetVisitor`] decides which edges to follow and receives every
//! reached target in pre- or post-order. Traversal does not deduplicate:
//! visitors that must see a target once track that themselves, typically in
//! [`TargetVisitor::descend`] or [`TargetVisitor::visit`].

use tracing::trace;

use super::error::GraphError;
use super::load::TargetGraph;
use super::types::{Dependency, Target, TargetKey};

/// When a target is visited relative to its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
  /// Before its dependencies.
  Pre,
  /// After all of its dependencies.
  Post,
}

/// Callbacks for [`TargetGraph::traverse`].
pub trait TargetVisitor {
  type Error: From<GraphError>;

  /// Called when a target is reached, before anything else happens to it.
  ///
  /// An error aborts the traversal without calling [`leave`](Self::leave).
  fn enter(&mut self, _target: &Target) -> Result<(), Self::Error> {
    Ok(())
  }

  /// Whether to follow the edge `from -> dep`.
  fn descend(&mut self, _from: &Target, _dep: &Dependency) -> bool {
    true
  }

  fn visit(&mut self, target: &Target) -> Result<(), Self::Error>;

  /// Called once the target and everything below it is done, also on error.
  fn leave(&mut self, _target: &Target) {}
}

impl TargetGraph {
  /// Walk the graph from `root` depth-first.
  pub fn traverse<V: TargetVisitor>(&self, root: &TargetKey, visitor: &mut V, order: Order) -> Result<(), V::Error> {
    let target = self.target(root).ok_or_else(|| GraphError::TargetNotFound {
      repository: root.repository.clone(),
      name: root.name.clone(),
    })?;
    self.walk(target, visitor, order)
  }

  fn walk<V: TargetVisitor>(&self, target: &Target, visitor: &mut V, order: Order) -> Result<(), V::Error> {
    visitor.enter(target)?;
    let result = self.walk_entered(target, visitor, order);
    visitor.leave(target);
    result
  }

  fn walk_entered<V: TargetVisitor>(&self, target: &Target, visitor: &mut V, order: Order) -> Result<(), V::Error> {
    trace!(target = %target.key, ?order, "visiting");

    if order == Order::Pre {
      visitor.visit(target)?;
    }

    for dep in &target.deps {
      if !visitor.descend(target, dep) {
        trace!(from = %target.key, to = %dep.key, "skipping edge");
        continue;
      }
      let next = self.target(&dep.key).ok_or_else(|| GraphError::DanglingDependency {
        from: target.key.clone(),
        to: dep.key.clone(),
      })?;
      self.walk(next, visitor, order)?;
    }

    if order == Order::Post {
      visitor.visit(target)?;
    }

    Ok(())
  }
}
