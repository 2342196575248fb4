//! Shared utilities.
//!
//! Filesystem helpers used by backends and output materialization, plus test helpers.

pub mod fs;
