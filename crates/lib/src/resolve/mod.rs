//! Reference resolution.
//!
//! A reference names another repository by its remote locator. Before the
//! remote is ever consulted, the reference's finder chain gets a chance to
//! discover a local checkout.
//!
//! # Modules
//!
//! - [`finder`] - The finder strategies and their search paths
//! - [`reference`] - Running a finder chain and the remote fallback

pub mod finder;
pub mod reference;

pub use finder::{FindError, Finder, ModuleFinder, PackageFinder, SearchPaths};
pub use reference::{ReferenceResolver, ResolveError};
