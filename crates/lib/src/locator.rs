//! Target locators and dependency references.
//!
//! A locator names a repository and optionally a revision selector and a
//! target. The grammar is:
//!
//! ```text
//! <repository>[///(@<branch>|=<commit>)][::<target>]
//! ```
//!
//! - **repository** - a path or remote locator. Empty means the current repository.
//! - **selector** - at most one of `@branch` or `=commit`.
//! - **target** - a qualified target name, split off at the **rightmost** `::`.
//!
//! Dependency references, as written in a target's `deps`, use a second grammar:
//!
//! ```text
//! name                      same package
//! //pkg/path:name           same repository, other package (also `pkg/path:name`)
//! @reference//pkg/path:name another repository, through a named reference
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Separator between the repository and the selector.
const SELECTOR_SEPARATOR: &str = "///";

/// Separator between the repository part and the target.
const TARGET_SEPARATOR: &str = "::";

/// Errors during locator or dependency-reference parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
  /// The input was empty.
  #[error("empty locator")]
  Empty,

  /// More than one `///` selector was given.
  #[error("locator '{0}' has more than one revision selector")]
  MultipleSelectors(String),

  /// A selector did not start with `@` or `=`, or mixed both.
  #[error("invalid revision selector '{0}' (expected @branch or =commit)")]
  InvalidSelector(String),

  /// A selector had no branch or commit after its marker.
  #[error("empty revision selector in '{0}'")]
  EmptySelector(String),

  /// A target name was malformed.
  #[error("invalid target name '{name}': {reason}")]
  InvalidTarget { name: String, reason: &'static str },

  /// A dependency reference was malformed.
  #[error("invalid dependency reference '{reference}': {reason}")]
  InvalidReference { reference: String, reason: &'static str },
}

/// A revision selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
  Branch(String),
  Commit(String),
}

impl fmt::Display for Selector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Selector::Branch(branch) => write!(f, "@{}", branch),
      Selector::Commit(commit) => write!(f, "={}", commit),
    }
  }
}

/// A parsed target locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
  /// Repository path or remote locator. Empty for the current repository.
  pub repository: String,
  pub selector: Option<Selector>,
  /// Qualified target name, if one was given.
  pub target: Option<String>,
}

impl Locator {
  /// Whether the locator refers to the current repository.
  pub fn is_current(&self) -> bool {
    self.repository.is_empty()
  }

  pub fn branch(&self) -> Option<&str> {
    match &self.selector {
      Some(Selector::Branch(branch)) => Some(branch),
      _ => None,
    }
  }

  pub fn commit(&self) -> Option<&str> {
    match &self.selector {
      Some(Selector::Commit(commit)) => Some(commit),
      _ => None,
    }
  }
}

impl FromStr for Locator {
  type Err = LocatorError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.is_empty() {
      return Err(LocatorError::Empty);
    }

    let (repo_part, target) = match s.rsplit_once(TARGET_SEPARATOR) {
      Some((repo, target)) => {
        split_target_name(target)?;
        (repo, Some(target.to_string()))
      }
      None => (s, None),
    };

    let mut parts = repo_part.split(SELECTOR_SEPARATOR);
    let repository = parts.next().unwrap_or_default().to_string();
    let selectors: Vec<&str> = parts.collect();

    let selector = match selectors.as_slice() {
      [] => None,
      [one] => Some(parse_selector(one)?),
      _ => return Err(LocatorError::MultipleSelectors(s.to_string())),
    };

    if repository.is_empty() && selector.is_none() && target.is_none() {
      return Err(LocatorError::Empty);
    }

    Ok(Self {
      repository,
      selector,
      target,
    })
  }
}

impl fmt::Display for Locator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.repository)?;
    if let Some(selector) = &self.selector {
      write!(f, "{}{}", SELECTOR_SEPARATOR, selector)?;
    }
    if let Some(target) = &self.target {
      write!(f, "{}{}", TARGET_SEPARATOR, target)?;
    }
    Ok(())
  }
}

fn parse_selector(raw: &str) -> Result<Selector, LocatorError> {
  let (marker, value) = match raw.chars().next() {
    Some(c @ ('@' | '=')) => (c, &raw[1..]),
    _ => return Err(LocatorError::InvalidSelector(raw.to_string())),
  };

  if value.is_empty() {
    return Err(LocatorError::EmptySelector(raw.to_string()));
  }
  if value.contains('@') || value.contains('=') {
    return Err(LocatorError::InvalidSelector(raw.to_string()));
  }

  Ok(match marker {
    '@' => Selector::Branch(value.to_string()),
    _ => Selector::Commit(value.to_string()),
  })
}

/// Split a qualified target name into `(package, name)`.
///
/// `name` is in the root package (`""`); `pkg/path:name` is in `pkg/path`.
pub fn split_target_name(qualified: &str) -> Result<(&str, &str), LocatorError> {
  let invalid = |reason| LocatorError::InvalidTarget {
    name: qualified.to_string(),
    reason,
  };

  let (package, name) = qualified.rsplit_once(':').unwrap_or(("", qualified));

  if name.is_empty() {
    return Err(invalid("empty name"));
  }
  if name.contains('/') {
    return Err(invalid("name contains '/'"));
  }
  if package.contains(':') {
    return Err(invalid("more than one ':'"));
  }
  if package.starts_with('/') || package.ends_with('/') || package.contains("//") {
    return Err(invalid("malformed package path"));
  }

  Ok((package, name))
}

/// Join a package and a name into a qualified target name.
pub fn qualify(package: &str, name: &str) -> String {
  if package.is_empty() {
    name.to_string()
  } else {
    format!("{}:{}", package, name)
  }
}

/// A parsed dependency reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyRef {
  /// A target in the same package as the dependent.
  Local { name: String },
  /// A target in another package of the same repository.
  Package { package: String, name: String },
  /// A target in another repository, reached through a named reference.
  External {
    reference: String,
    package: String,
    name: String,
  },
}

impl DependencyRef {
  /// Parse a dependency reference.
  pub fn parse(reference: &str) -> Result<Self, LocatorError> {
    let invalid = |reason| LocatorError::InvalidReference {
      reference: reference.to_string(),
      reason,
    };

    if reference.is_empty() {
      return Err(invalid("empty reference"));
    }

    if let Some(rest) = reference.strip_prefix('@') {
      let (name, path) = rest.split_once("//").ok_or_else(|| invalid("missing '//' after reference name"))?;
      if name.is_empty() || name.contains('/') || name.contains(':') {
        return Err(invalid("invalid reference name"));
      }
      let (package, target) = split_target_name(path).map_err(|_| invalid("invalid target path"))?;
      return Ok(DependencyRef::External {
        reference: name.to_string(),
        package: package.to_string(),
        name: target.to_string(),
      });
    }

    let (path, explicit) = match reference.strip_prefix("//") {
      Some(rest) => (rest, true),
      None => (reference, false),
    };

    if !explicit && !path.contains(':') {
      if path.contains('/') {
        return Err(invalid("package path without ':name'"));
      }
      return Ok(DependencyRef::Local { name: path.to_string() });
    }

    let (package, name) = split_target_name(path).map_err(|_| invalid("invalid target path"))?;
    Ok(DependencyRef::Package {
      package: package.to_string(),
      name: name.to_string(),
    })
  }

  /// The qualified target name, resolved against the dependent's package.
  pub fn qualified_name(&self, current_package: &str) -> String {
    match self {
      DependencyRef::Local { name } => qualify(current_package, name),
      DependencyRef::Package { package, name } => qualify(package, name),
      DependencyRef::External { package, name, .. } => qualify(package, name),
    }
  }
}
