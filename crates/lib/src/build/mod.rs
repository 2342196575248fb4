//! Build runs.
//!
//! A run builds one or more root targets of a loaded
//! [`TargetGraph`](crate::graph::TargetGraph). It is identified by a
//! [`BuildTag`], writes everything under `<build_root>/<tag>`, and builds each
//! target at most once.
//!
//! # Modules
//!
//! - [`orchestrator`] - The run state machine: prepare, build, materialize
//! - [`context`] - [`BuildContext`], the view of the run a backend gets
//! - [`install`] - Auxiliary package installs, cached per run
//! - [`output`] - Output directory links and namespace cleanup

pub mod context;
mod error;
pub mod install;
pub mod orchestrator;
pub mod output;
mod types;

pub use context::BuildContext;
pub use error::BuildError;
pub use install::{InstallCache, InstallError};
pub use orchestrator::{BuildOutput, Orchestrator};
pub use types::*;
