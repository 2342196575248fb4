//! The target dependency graph.
//!
//! This module handles:
//! - Loading repositories through a [`SpecProvider`](crate::spec::SpecProvider), once per uri
//! - Materializing targets and resolving every dependency edge, including edges
//!   into other repositories through references
//! - Detecting load-time cycles with an explicit trace stack
//! - Depth-first traversal of the loaded graph
//!
//! # Modules
//!
//! - [`types`] - Repositories, targets, keys and dependency edges
//! - [`load`] - [`TargetGraph`] and its loading algorithm
//! - [`traverse`] - The [`TargetVisitor`] trait and traversal orders

mod error;
pub mod load;
pub(crate) mod trace;
pub mod traverse;
mod types;

pub use error::GraphError;
pub use load::{LoadOptions, TargetGraph};
pub use traverse::{Order, TargetVisitor};
pub use types::*;
