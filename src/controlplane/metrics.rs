//! Provisioning Metrics
//!
//! Prometheus collectors for the provisioning pipeline, kept in their own
//! registry so that every provisioner instance exposes an isolated set.

use crate::error::{Error, Result};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Metric name prefix
pub const METRICS_NAMESPACE: &str = "volume_provisioner";

/// Outcome label values
pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_CLAIM_ERROR: &str = "claim_error";
pub const OUTCOME_ALLOCATION_ERROR: &str = "allocation_error";
pub const OUTCOME_BACKEND_ERROR: &str = "backend_error";
pub const OUTCOME_ERROR: &str = "error";

/// Collectors for provisioning and removal
#[derive(Clone)]
pub struct ProvisionMetrics {
    registry: Registry,
    provisions: IntCounterVec,
    removals: IntCounter,
    allocated_addresses: IntGauge,
    provision_duration: Histogram,
}

impl ProvisionMetrics {
    /// Create collectors registered in a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let provisions = IntCounterVec::new(
            Opts::new("provisions_total", "Volume provision attempts by outcome")
                .namespace(METRICS_NAMESPACE),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let removals = IntCounter::with_opts(
            Opts::new("removals_total", "Volumes removed").namespace(METRICS_NAMESPACE),
        )
        .map_err(metrics_error)?;
        let allocated_addresses = IntGauge::with_opts(
            Opts::new("allocated_addresses", "Addresses currently reserved by volumes")
                .namespace(METRICS_NAMESPACE),
        )
        .map_err(metrics_error)?;
        let provision_duration = Histogram::with_opts(
            HistogramOpts::new(
                "provision_duration_seconds",
                "Duration of provision operations",
            )
            .namespace(METRICS_NAMESPACE),
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(provisions.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(removals.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(allocated_addresses.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(provision_duration.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            provisions,
            removals,
            allocated_addresses,
            provision_duration,
        })
    }

    /// Record one provision attempt
    pub fn record_provision(&self, outcome: &str, seconds: f64) {
        self.provisions.with_label_values(&[outcome]).inc();
        self.provision_duration.observe(seconds);
    }

    pub fn record_removal(&self) {
        self.removals.inc();
    }

    pub fn set_allocated_addresses(&self, count: usize) {
        self.allocated_addresses.set(count as i64);
    }

    /// Provision count for one outcome
    pub fn provisions(&self, outcome: &str) -> u64 {
        self.provisions.with_label_values(&[outcome]).get()
    }

    pub fn removals(&self) -> u64 {
        self.removals.get()
    }

    pub fn allocated_addresses(&self) -> i64 {
        self.allocated_addresses.get()
    }

    /// Render in the Prometheus text exposition format
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

impl std::fmt::Debug for ProvisionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionMetrics")
            .field("removals", &self.removals.get())
            .field("allocated_addresses", &self.allocated_addresses.get())
            .finish()
    }
}

/// Outcome label for a failed provision
pub fn outcome_of(err: &Error) -> &'static str {
    match err {
        Error::AddressPoolExhausted { .. }
        | Error::AddressInUse { .. }
        | Error::AddressOutsideSubnet { .. } => OUTCOME_ALLOCATION_ERROR,
        e if e.is_claim_error() => OUTCOME_CLAIM_ERROR,
        e if e.is_retryable() => OUTCOME_BACKEND_ERROR,
        _ => OUTCOME_ERROR,
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_encode() {
        let metrics = ProvisionMetrics::new().unwrap();
        metrics.record_provision(OUTCOME_SUCCESS, 0.2);
        metrics.record_provision(OUTCOME_CLAIM_ERROR, 0.01);
        metrics.record_removal();
        metrics.set_allocated_addresses(3);

        assert_eq!(metrics.provisions(OUTCOME_SUCCESS), 1);
        assert_eq!(metrics.removals(), 1);
        assert_eq!(metrics.allocated_addresses(), 3);

        let (content_type, body) = metrics.encode().unwrap();
        let body = String::from_utf8(body).unwrap();
        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("volume_provisioner_provisions_total{outcome=\"success\"} 1"));
        assert!(body.contains("volume_provisioner_allocated_addresses 3"));
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = ProvisionMetrics::new().unwrap();
        let b = ProvisionMetrics::new().unwrap();
        a.record_removal();
        assert_eq!(b.removals(), 0);
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(outcome_of(&Error::missing("region")), OUTCOME_CLAIM_ERROR);
        assert_eq!(
            outcome_of(&Error::AddressPoolExhausted {
                subnet: "10.0.0.0/30".into(),
                requested: 3,
                available: 2
            }),
            OUTCOME_ALLOCATION_ERROR
        );
        assert_eq!(
            outcome_of(&Error::backend("nomad", "submit", "timeout")),
            OUTCOME_BACKEND_ERROR
        );
        assert_eq!(outcome_of(&Error::IncompleteSpec("x".into())), OUTCOME_ERROR);
    }
}
