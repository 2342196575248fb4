//! Explicit push/pop cycle detection.
//!
//! Both the load-time trace and the build-time "currently building" set are a
//! [`Trace`]: a stack of keys with a set for membership checks. Entering a key
//! that is already on the stack reports the chain that closes the loop.

use std::collections::HashSet;

use super::types::TargetKey;

#[derive(Debug, Default)]
pub(crate) struct Trace {
  stack: Vec<TargetKey>,
  members: HashSet<TargetKey>,
}

impl Trace {
  /// Push `key`. If it is already on the stack, returns the loop as `a -> b -> a`.
  pub(crate) fn enter(&mut self, key: &TargetKey) -> Result<(), String> {
    if self.members.contains(key) {
      let start = self.stack.iter().position(|k| k == key).unwrap_or(0);
      let chain = self.stack[start..]
        .iter()
        .chain(std::iter::once(key))
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" -> ");
      return Err(chain);
    }

    self.stack.push(key.clone());
    self.members.insert(key.clone());
    Ok(())
  }

  /// Pop `key`.
  pub(crate) fn leave(&mut self, key: &TargetKey) {
    if self.members.remove(key)
      && let Some(pos) = self.stack.iter().rposition(|k| k == key)
    {
      self.stack.remove(pos);
    }
  }

  pub(crate) fn contains(&self, key: &TargetKey) -> bool {
    self.members.contains(key)
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.stack.is_empty()
  }
}
