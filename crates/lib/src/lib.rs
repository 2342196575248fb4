//! polybuild-lib: Core types and logic for polybuild
//!
//! This crate provides the pieces of a polyglot build run:
//! - `spec`: the per-repository `polybuild.json` model and its providers
//! - `graph`: repositories and targets loaded into one keyed graph, across references
//! - `build`: the orchestrator that builds each target of a run exactly once
//! - `backend`: one backend per target kind, selected from a static registry

pub mod backend;
pub mod build;
pub mod consts;
pub mod graph;
pub mod locator;
pub mod platform;
pub mod resolve;
pub mod spec;
pub mod util;
