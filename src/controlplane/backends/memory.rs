//! In-Memory Orchestrator Backend
//!
//! A simulated orchestrator: jobs and evaluations are kept in process and
//! placement is reduced to a host count. Groups constrained to distinct
//! hosts that need more hosts than the cluster has are blocked.

use crate::domain::ports::{Evaluation, JobHandle, JobRecord, JobStatus, OrchestratorBackend};
use crate::error::{Error, Result};
use crate::topology::Job;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Backend name
pub const MEMORY_BACKEND: &str = "memory";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the simulated orchestrator
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Number of simulated hosts
    pub hosts: usize,
    /// Placeable jobs go straight to `running`
    pub auto_run: bool,
    /// Reject every submission (transport failure simulation)
    pub fail_submissions: bool,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            hosts: 3,
            auto_run: true,
            fail_submissions: false,
        }
    }
}

// =============================================================================
// Job State
// =============================================================================

#[derive(Debug, Clone)]
struct StoredJob {
    job: Job,
    status: JobStatus,
    status_description: String,
    submitted_at: DateTime<Utc>,
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// Simulated orchestrator
pub struct InMemoryBackend {
    config: InMemoryConfig,
    jobs: DashMap<String, StoredJob>,
    evaluations: DashMap<String, Vec<Evaluation>>,
    fail_submissions: AtomicBool,
    index: AtomicU64,
}

impl InMemoryBackend {
    /// Create a new in-memory backend
    pub fn new(config: InMemoryConfig) -> Arc<Self> {
        info!(
            "In-memory orchestrator with {} hosts (auto-run: {})",
            config.hosts, config.auto_run
        );
        Arc::new(Self {
            fail_submissions: AtomicBool::new(config.fail_submissions),
            config,
            jobs: DashMap::new(),
            evaluations: DashMap::new(),
            index: AtomicU64::new(0),
        })
    }

    /// Toggle submission failures
    pub fn set_fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Force a job into a state, as the scheduler would
    pub fn set_status(&self, name: &str, status: JobStatus) -> Result<()> {
        let mut stored = self
            .jobs
            .get_mut(name)
            .ok_or_else(|| not_found("job", name))?;
        stored.status = status;
        Ok(())
    }

    /// When a job was last submitted
    pub fn submitted_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.jobs.get(name).map(|j| j.submitted_at)
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    fn next_index(&self) -> u64 {
        self.index.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn eval_id(index: u64) -> String {
        format!("eval-{:08x}", index)
    }

    /// Name of the first group whose distinct-host placement cannot be met
    fn blocked_group(&self, job: &Job) -> Option<(String, usize)> {
        job.task_groups
            .iter()
            .find(|g| g.has_distinct_hosts() && g.count > self.config.hosts)
            .map(|g| (g.name.clone(), g.count))
    }

    fn record_evaluation(&self, job: &Job, trigger: &str, blocked: Option<String>) -> Evaluation {
        let index = self.next_index();
        let eval = Evaluation {
            id: Self::eval_id(index),
            priority: job.priority,
            eval_type: job.job_type.clone(),
            triggered_by: trigger.to_string(),
            job_id: job.id.clone(),
            status: "complete".to_string(),
            status_description: String::new(),
            blocked_eval: blocked,
            create_index: index,
        };
        self.evaluations
            .entry(job.id.clone())
            .or_default()
            .push(eval.clone());
        eval
    }
}

#[async_trait]
impl OrchestratorBackend for InMemoryBackend {
    fn name(&self) -> &str {
        MEMORY_BACKEND
    }

    async fn submit(&self, job: &Job) -> Result<JobHandle> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(Error::backend(MEMORY_BACKEND, "submit", "orchestrator unavailable"));
        }
        if job.id.trim().is_empty() {
            return Err(Error::backend(MEMORY_BACKEND, "submit", "job has no ID"));
        }

        let (status, description, blocked) = match self.blocked_group(job) {
            Some((group, count)) => {
                let blocked_id = Self::eval_id(self.next_index());
                let description = format!(
                    "group {} needs {} distinct hosts, {} available",
                    group, count, self.config.hosts
                );
                (JobStatus::Pending, description, Some(blocked_id))
            }
            None if self.config.auto_run => (JobStatus::Running, String::new(), None),
            None => (JobStatus::Pending, String::new(), None),
        };

        let eval = self.record_evaluation(job, "job-register", blocked);
        self.jobs.insert(
            job.id.clone(),
            StoredJob {
                job: job.clone(),
                status,
                status_description: description,
                submitted_at: Utc::now(),
            },
        );

        debug!("Registered job {} as {} ({})", job.id, status, eval.id);
        Ok(JobHandle {
            job_id: job.id.clone(),
            eval_id: eval.id,
        })
    }

    async fn read(&self, name: &str) -> Result<JobRecord> {
        let stored = self.jobs.get(name).ok_or_else(|| not_found("job", name))?;
        Ok(JobRecord {
            job: stored.job.clone(),
            status: stored.status,
            status_description: stored.status_description.clone(),
        })
    }

    async fn delete(&self, name: &str) -> Result<JobHandle> {
        let (_, stored) = self
            .jobs
            .remove(name)
            .ok_or_else(|| not_found("job", name))?;
        let eval = self.record_evaluation(&stored.job, "job-deregister", None);

        debug!("Deregistered job {} ({})", name, eval.id);
        Ok(JobHandle {
            job_id: name.to_string(),
            eval_id: eval.id,
        })
    }

    async fn latest_evaluation(&self, name: &str) -> Result<Evaluation> {
        self.evaluations
            .get(name)
            .and_then(|evals| evals.iter().max_by_key(|e| e.create_index).cloned())
            .ok_or_else(|| not_found("evaluation", name))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

fn not_found(kind: &str, name: &str) -> Error {
    Error::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}
