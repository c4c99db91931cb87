//! Provisioner
//!
//! The provisioning pipeline end to end:
//!
//! ```text
//! VolumeClaim -> resolve -> allocate -> build topology -> submit -> JobHandle
//! name -> read job / latest evaluation -> reconcile -> VolumeStatus
//! ```
//!
//! Volume state lives in the orchestrator; the only state held here is the
//! address reservations of the allocator.

use super::reconciler::{StatusReconciler, VolumeStatus};
use super::resolver::PropertyResolver;
use crate::controlplane::metrics::{outcome_of, ProvisionMetrics, OUTCOME_SUCCESS};
use crate::domain::claim::VolumeClaim;
use crate::domain::ports::{JobHandle, OrchestratorBackendRef};
use crate::domain::properties::PropertySet;
use crate::error::{Error, Result};
use crate::network::AddressAllocator;
use crate::topology::{Job, TopologyBuilder};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Provisioning facade over one orchestrator backend
pub struct Provisioner {
    resolver: PropertyResolver,
    allocator: Arc<AddressAllocator>,
    builder: TopologyBuilder,
    backend: OrchestratorBackendRef,
    metrics: Arc<ProvisionMetrics>,
}

impl Provisioner {
    /// Create a new provisioner
    pub fn new(
        resolver: PropertyResolver,
        allocator: Arc<AddressAllocator>,
        builder: TopologyBuilder,
        backend: OrchestratorBackendRef,
        metrics: Arc<ProvisionMetrics>,
    ) -> Arc<Self> {
        info!(
            "Provisioner ready: backend {}, defaults from {}",
            backend.name(),
            resolver.source_name()
        );
        Arc::new(Self {
            resolver,
            allocator,
            builder,
            backend,
            metrics,
        })
    }

    pub fn backend(&self) -> &OrchestratorBackendRef {
        &self.backend
    }

    pub fn allocator(&self) -> &Arc<AddressAllocator> {
        &self.allocator
    }

    pub fn metrics(&self) -> &Arc<ProvisionMetrics> {
        &self.metrics
    }

    // =========================================================================
    // Pipeline Steps
    // =========================================================================

    /// Resolve a claim's properties and allocate its missing addresses.
    ///
    /// The returned claim carries every resolved and allocated value.
    pub fn resolve_and_allocate(&self, mut claim: VolumeClaim) -> Result<VolumeClaim> {
        let network = self.resolver.resolve(&mut claim)?;
        let allocation =
            self.allocator
                .allocate_for_claim(&mut claim, network.subnet, network.replica_count)?;
        self.metrics
            .set_allocated_addresses(self.allocator.total_reserved());

        debug!(
            "Volume {} allocated frontend {} and replicas {}",
            claim.name,
            allocation.frontend_ip,
            allocation.backend_ips_string()
        );
        Ok(claim)
    }

    /// Build the job for a resolved and allocated claim
    pub fn build_topology(&self, claim: &VolumeClaim) -> Result<Job> {
        let props = PropertySet::from_claim(claim).map_err(|e| match e {
            Error::MissingProperty { key } => {
                Error::IncompleteSpec(format!("volume {} has no {}", claim.name, key))
            }
            other => other,
        })?;
        self.builder.build(&props, &props.allocation())
    }

    /// Hand a job to the orchestrator
    pub async fn submit(&self, job: &Job) -> Result<JobHandle> {
        let handle = self.backend.submit(job).await?;
        info!(
            "Submitted job {} to {} (evaluation {})",
            handle.job_id,
            self.backend.name(),
            handle.eval_id
        );
        Ok(handle)
    }

    // =========================================================================
    // Volume Operations
    // =========================================================================

    /// Provision a volume and report the evaluation of its submission.
    ///
    /// Addresses reserved by this attempt are released again if it fails
    /// before the job was accepted.
    pub async fn provision(&self, claim: VolumeClaim) -> Result<VolumeStatus> {
        let start = Instant::now();
        let result = self.provision_inner(claim).await;
        let seconds = start.elapsed().as_secs_f64();

        match &result {
            Ok(status) => {
                self.metrics.record_provision(OUTCOME_SUCCESS, seconds);
                info!("Provisioned volume {}: {}", status.name, status.reason);
            }
            Err(e) => self.metrics.record_provision(outcome_of(e), seconds),
        }
        result
    }

    async fn provision_inner(&self, claim: VolumeClaim) -> Result<VolumeStatus> {
        let name = claim.name.clone();
        info!("Provisioning volume {}", name);

        let held_before = self.allocator.addresses_of(&name);
        let claim = self.resolve_and_allocate(claim)?;

        let submitted = match self.build_topology(&claim) {
            Ok(job) => self.submit(&job).await,
            Err(e) => Err(e),
        };
        let handle = match submitted {
            Ok(handle) => handle,
            Err(e) => {
                let fresh: Vec<_> = self
                    .allocator
                    .addresses_of(&name)
                    .into_iter()
                    .filter(|addr| !held_before.contains(addr))
                    .collect();
                let released = self.allocator.release_addresses(&name, &fresh);
                self.metrics
                    .set_allocated_addresses(self.allocator.total_reserved());
                warn!(
                    "Provisioning volume {} failed, released {} addresses: {}",
                    name, released, e
                );
                return Err(e);
            }
        };

        let eval = self.backend.latest_evaluation(&handle.job_id).await?;
        Ok(StatusReconciler::from_evaluation(&name, &eval))
    }

    /// Delete a volume's job and free its addresses
    pub async fn remove(&self, name: &str) -> Result<JobHandle> {
        let handle = self.backend.delete(name).await?;
        let released = self.allocator.release(name);
        self.metrics.record_removal();
        self.metrics
            .set_allocated_addresses(self.allocator.total_reserved());

        info!("Removed volume {} ({} addresses released)", name, released);
        Ok(handle)
    }

    /// Current status of a volume
    pub async fn status(&self, name: &str) -> Result<VolumeStatus> {
        let record = self.backend.read(name).await?;
        if StatusReconciler::uses_job_metadata(&record) {
            return StatusReconciler::reconcile(&record, None);
        }
        let eval = self.backend.latest_evaluation(name).await?;
        StatusReconciler::reconcile(&record, Some(&eval))
    }

    /// Check the orchestrator is reachable
    pub async fn health_check(&self) -> Result<bool> {
        self.backend.health_check().await
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("backend", &self.backend.name())
            .field("resolver", &self.resolver)
            .finish()
    }
}
