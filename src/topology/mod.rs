//! Topology Module
//!
//! Job definitions in orchestrator shape and the builder that produces them
//! from resolved volume properties.

pub mod builder;
pub mod job;

pub use builder::*;
pub use job::*;
