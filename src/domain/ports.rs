//! Domain Ports - Core trait definitions for the provisioner
//!
//! These traits define the boundaries between the provisioning pipeline and
//! external systems. Adapters implement these traits to provide concrete
//! functionality.

use super::claim::PropertyKey;
use crate::error::Result;
use crate::topology::Job;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Default Property Source Port
// =============================================================================

/// Properties an orchestrator can supply per datacenter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    NetworkType,
    NetworkCidr,
    SubnetPrefix,
    Interface,
    PersistenceLocation,
    ReplicaCount,
    ControllerImage,
}

impl PropertyKind {
    /// Kinds that map directly onto claim properties
    pub const CLAIM_KINDS: [PropertyKind; 6] = [
        PropertyKind::ControllerImage,
        PropertyKind::ReplicaCount,
        PropertyKind::NetworkType,
        PropertyKind::NetworkCidr,
        PropertyKind::Interface,
        PropertyKind::PersistenceLocation,
    ];

    /// The claim property this kind fills, if any
    pub fn key(self) -> Option<PropertyKey> {
        match self {
            PropertyKind::NetworkType => Some(PropertyKey::NetworkType),
            PropertyKind::NetworkCidr => Some(PropertyKey::NetworkCidr),
            PropertyKind::Interface => Some(PropertyKey::Interface),
            PropertyKind::PersistenceLocation => Some(PropertyKey::PersistenceLocation),
            PropertyKind::ReplicaCount => Some(PropertyKey::ReplicaCount),
            PropertyKind::ControllerImage => Some(PropertyKey::ControllerImage),
            PropertyKind::SubnetPrefix => None,
        }
    }
}

/// Port for orchestrator- and datacenter-scoped defaults
pub trait DefaultPropertySource: Send + Sync {
    /// Name of the source
    fn name(&self) -> &str;

    /// Region requests are sent to
    fn region(&self) -> Result<String>;

    /// Datacenter used when a claim does not name one
    fn default_datacenter(&self) -> Result<String>;

    /// Look up a datacenter-scoped value.
    ///
    /// `Ok(None)` means the datacenter has no value for this kind;
    /// an unknown datacenter is an error.
    fn lookup(&self, datacenter: &str, kind: PropertyKind) -> Result<Option<String>>;
}

// =============================================================================
// Orchestrator Records
// =============================================================================

/// Lifecycle state of a submitted job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Dead,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Dead => write!(f, "dead"),
            JobStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A job as the orchestrator currently sees it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job: Job,
    pub status: JobStatus,
    pub status_description: String,
}

/// The orchestrator's scheduling record for a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Evaluation {
    #[serde(rename = "ID")]
    pub id: String,
    pub priority: i32,
    #[serde(rename = "Type")]
    pub eval_type: String,
    pub triggered_by: String,
    #[serde(rename = "JobID")]
    pub job_id: String,
    pub status: String,
    pub status_description: String,
    /// Evaluation created for placements that could not be made yet
    pub blocked_eval: Option<String>,
    pub create_index: u64,
}

/// Acknowledgement of a submission or removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: String,
    pub eval_id: String,
}

// =============================================================================
// Orchestrator Backend Port
// =============================================================================

/// Port for orchestrator job operations
#[async_trait]
pub trait OrchestratorBackend: Send + Sync {
    /// Get backend name
    fn name(&self) -> &str;

    /// Register a job; resubmitting the same name updates it
    async fn submit(&self, job: &Job) -> Result<JobHandle>;

    /// Read a job by name; unknown names are `NotFound`
    async fn read(&self, name: &str) -> Result<JobRecord>;

    /// Deregister a job by name; unknown names are `NotFound`
    async fn delete(&self, name: &str) -> Result<JobHandle>;

    /// Most recent evaluation of a job
    async fn latest_evaluation(&self, name: &str) -> Result<Evaluation>;

    /// Check if the orchestrator is reachable
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type OrchestratorBackendRef = Arc<dyn OrchestratorBackend>;
pub type DefaultPropertySourceRef = Arc<dyn DefaultPropertySource>;
