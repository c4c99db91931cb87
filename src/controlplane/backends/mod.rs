//! Orchestrator Backend Adapters
//!
//! Provides adapters for the orchestrators volume jobs can run on:
//! - Memory: simulated orchestrator for tests and local runs
//! - Nomad: HTTP job API

pub mod memory;
pub mod nomad;

pub use memory::*;
pub use nomad::*;

use crate::domain::ports::OrchestratorBackendRef;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Factory for creating orchestrator backend adapters
pub struct BackendFactory;

impl BackendFactory {
    /// Create a backend adapter by name
    pub fn create(name: &str, config: BackendConfig) -> Result<OrchestratorBackendRef> {
        match name.to_lowercase().as_str() {
            MEMORY_BACKEND => Ok(InMemoryBackend::new(config.memory)),
            NOMAD_BACKEND => Ok(Arc::new(NomadBackend::new(config.nomad)?)),
            _ => Err(Error::Configuration(format!(
                "unknown orchestrator '{}', expected '{}' or '{}'",
                name, MEMORY_BACKEND, NOMAD_BACKEND
            ))),
        }
    }
}

/// Combined backend configuration
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    pub memory: InMemoryConfig,
    pub nomad: NomadConfig,
}
