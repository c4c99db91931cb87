//! Error types for the volume provisioner
//!
//! Provides structured error types for property resolution, address
//! allocation, topology construction, and orchestrator backends.

use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Property Resolution Errors
    // =========================================================================
    #[error("Missing property: {key}")]
    MissingProperty { key: String },

    #[error("Invalid property {key}='{value}': {reason}")]
    InvalidProperty {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Replica IP count '{ips}' does not match replica count '{replicas}'")]
    ReplicaIpCountMismatch { ips: usize, replicas: usize },

    #[error("Unknown datacenter: {datacenter}")]
    UnknownDatacenter { datacenter: String },

    // =========================================================================
    // Address Allocation Errors
    // =========================================================================
    #[error("Invalid CIDR '{cidr}': {reason}")]
    InvalidCidr { cidr: String, reason: String },

    #[error("Address pool exhausted in {subnet}: requested {requested}, available {available}")]
    AddressPoolExhausted {
        subnet: String,
        requested: usize,
        available: usize,
    },

    #[error("Address {address} is outside usable range of {subnet}")]
    AddressOutsideSubnet { address: String, subnet: String },

    #[error("Address {address} already held by volume {owner}")]
    AddressInUse { address: String, owner: String },

    // =========================================================================
    // Topology Errors
    // =========================================================================
    #[error("Incomplete topology spec: {0}")]
    IncompleteSpec(String),

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Resource not found: {kind}/{name}")]
    NotFound { kind: String, name: String },

    #[error("Backend operation failed: {backend} - {operation}: {reason}")]
    Backend {
        backend: String,
        operation: String,
        reason: String,
    },

    #[error("Orchestrator HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a missing property error
    pub fn missing(key: impl Into<String>) -> Self {
        Error::MissingProperty { key: key.into() }
    }

    /// Shorthand for a backend failure
    pub fn backend(
        backend: impl Into<String>,
        operation: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Error::Backend {
            backend: backend.into(),
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if a caller may reasonably retry the same request.
    ///
    /// The provisioner itself never retries; this only classifies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Backend { .. } | Error::Http(_))
    }

    /// Check if this error denotes an unknown volume
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if this error was caused by the claim itself
    pub fn is_claim_error(&self) -> bool {
        matches!(
            self,
            Error::MissingProperty { .. }
                | Error::InvalidProperty { .. }
                | Error::ReplicaIpCountMismatch { .. }
                | Error::UnknownDatacenter { .. }
                | Error::InvalidCidr { .. }
                | Error::AddressOutsideSubnet { .. }
        )
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;
