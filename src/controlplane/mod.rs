//! Control Plane Module
//!
//! Orchestrator adapters, the registry they are looked up in, and the
//! outer surfaces (REST API, metrics) of the provisioner.

pub mod api;
pub mod backends;
pub mod metrics;
pub mod registry;

pub use api::*;
pub use backends::*;
pub use metrics::*;
pub use registry::*;
