//! Repository specifications.
//!
//! A repository describes its targets and cross-repository references in a
//! single `polybuild.json` file at its root. This module defines the
//! deserialized form of that file and the [`SpecProvider`] seam through which
//! the target graph obtains it.
//!
//! # Modules
//!
//! - [`types`] - The specification model (repositories, targets, references, finders)
//! - [`provider`] - The provider trait plus JSON and in-memory implementations

pub mod provider;
mod types;

pub use provider::{JsonSpecProvider, SpecError, SpecProvider, StaticSpecProvider};
pub use types::*;
