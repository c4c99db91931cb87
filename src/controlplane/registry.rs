//! Orchestrator Registry
//!
//! Built once at start-up and passed to whatever needs an orchestrator.
//! Each orchestrator registers the capabilities it has; callers ask for a
//! capability by orchestrator name and get `None` when it is not offered.

use crate::domain::ports::{DefaultPropertySourceRef, OrchestratorBackendRef};
use std::collections::BTreeMap;
use tracing::info;

/// What an orchestrator can be asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Submit, read and delete jobs
    Jobs,
    /// Supply datacenter-scoped property defaults
    DefaultProperties,
}

#[derive(Default, Clone)]
struct OrchestratorEntry {
    backend: Option<OrchestratorBackendRef>,
    property_source: Option<DefaultPropertySourceRef>,
}

/// Registry of orchestrators keyed by name
#[derive(Default, Clone)]
pub struct OrchestratorRegistry {
    entries: BTreeMap<String, OrchestratorEntry>,
}

impl OrchestratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the job backend of an orchestrator
    pub fn with_backend(mut self, backend: OrchestratorBackendRef) -> Self {
        let name = backend.name().to_string();
        info!("Registered orchestrator backend {}", name);
        self.entries.entry(name).or_default().backend = Some(backend);
        self
    }

    /// Register the default-property source of an orchestrator
    pub fn with_property_source(
        mut self,
        orchestrator: impl Into<String>,
        source: DefaultPropertySourceRef,
    ) -> Self {
        let orchestrator = orchestrator.into();
        info!(
            "Registered property source {} for orchestrator {}",
            source.name(),
            orchestrator
        );
        self.entries.entry(orchestrator).or_default().property_source = Some(source);
        self
    }

    /// Job backend of an orchestrator, if it has one
    pub fn backend(&self, orchestrator: &str) -> Option<OrchestratorBackendRef> {
        self.entries.get(orchestrator)?.backend.clone()
    }

    /// Default-property source of an orchestrator, if it has one
    pub fn property_source(&self, orchestrator: &str) -> Option<DefaultPropertySourceRef> {
        self.entries.get(orchestrator)?.property_source.clone()
    }

    pub fn supports(&self, orchestrator: &str, capability: Capability) -> bool {
        match capability {
            Capability::Jobs => self.backend(orchestrator).is_some(),
            Capability::DefaultProperties => self.property_source(orchestrator).is_some(),
        }
    }

    /// Registered orchestrator names, sorted
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

impl std::fmt::Debug for OrchestratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorRegistry")
            .field("orchestrators", &self.names())
            .finish()
    }
}
