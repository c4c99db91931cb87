//! Volume Topology Provisioner
//!
//! Provisions replicated block-storage volumes by turning a volume claim
//! into a frontend/replica job topology and submitting it to a pluggable
//! cluster orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          REST API (axum)                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                           Provisioner                                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐ │
//! │  │   Property     │  │    Address     │  │       Topology             │ │
//! │  │   Resolver     │─▶│   Allocator    │─▶│       Builder              │ │
//! │  └───────┬────────┘  │ (per-scope     │  └─────────────┬──────────────┘ │
//! │          │           │  ledgers)      │                │                │
//! │          │           └────────────────┘                ▼                │
//! │          │                                  ┌────────────────────────┐  │
//! │          │                                  │   Status Reconciler    │  │
//! │          │                                  └───────────▲────────────┘  │
//! ├──────────┼──────────────────────────────────────────────┼───────────────┤
//! │          ▼              Orchestrator Registry           │               │
//! │  ┌────────────────────────────┐  ┌──────────────────────┴─────────────┐ │
//! │  │  Datacenter Defaults       │  │   Backends (Memory / Nomad)        │ │
//! │  └────────────────────────────┘  └────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`domain`]: Claims, typed property keys, resolved property sets, ports
//! - [`network`]: CIDR arithmetic and address allocation
//! - [`topology`]: Job types and the topology builder
//! - [`provisioning`]: Resolver, provisioner facade, status reconciler
//! - [`controlplane`]: Orchestrator backends, registry, REST API, metrics
//! - [`config`]: Datacenter configuration
//! - [`error`]: Error types and handling

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod network;
pub mod provisioning;
pub mod topology;

// Re-export commonly used types
pub use config::{DatacenterConfig, DatacenterDefaults, ProvisionerConfig};

pub use controlplane::{
    ApiServer, ApiServerConfig, BackendConfig, BackendFactory, Capability, InMemoryBackend,
    InMemoryConfig, NomadBackend, NomadConfig, OrchestratorRegistry, ProvisionMetrics,
};

pub use domain::{
    DefaultPropertySource, Evaluation, JobHandle, JobRecord, JobStatus, OrchestratorBackend,
    PropertyKey, PropertyKind, PropertySet, VolumeClaim,
};

pub use error::{Error, Result};

pub use network::{AddressAllocator, Ipv4Cidr, NetworkAllocation};

pub use provisioning::{PropertyResolver, Provisioner, StatusReconciler, VolumeStatus};

pub use topology::{Job, TopologyBuilder, TopologyConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
