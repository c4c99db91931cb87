//! Nomad Orchestrator Adapter
//!
//! Submits, reads and deregisters volume jobs through the Nomad HTTP API.

use crate::domain::ports::{Evaluation, JobHandle, JobRecord, JobStatus, OrchestratorBackend};
use crate::error::{Error, Result};
use crate::topology::Job;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Backend name
pub const NOMAD_BACKEND: &str = "nomad";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Nomad adapter
#[derive(Debug, Clone)]
pub struct NomadConfig {
    /// API address, e.g. `http://127.0.0.1:4646`
    pub address: String,
    /// Region passed on every request
    pub region: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for NomadConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:4646".to_string(),
            region: None,
            timeout_secs: 30,
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct RegisterRequest<'a> {
    #[serde(rename = "Job")]
    job: &'a Job,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct EvalResponse {
    #[serde(rename = "EvalID")]
    eval_id: String,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    #[serde(flatten)]
    job: Job,
    #[serde(rename = "Status", default)]
    status: JobStatus,
    #[serde(rename = "StatusDescription", default)]
    status_description: String,
}

// =============================================================================
// Nomad Adapter
// =============================================================================

/// Adapter for the Nomad job API
pub struct NomadBackend {
    config: NomadConfig,
    client: Client,
}

impl NomadBackend {
    /// Create a new Nomad adapter
    pub fn new(config: NomadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("Nomad HTTP client: {}", e)))?;

        info!("Nomad adapter targeting {}", config.address);
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &NomadConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        let base = self.config.address.trim_end_matches('/');
        match &self.config.region {
            Some(region) => format!(
                "{}/v1/{}?region={}",
                base,
                path,
                urlencoding::encode(region)
            ),
            None => format!("{}/v1/{}", base, path),
        }
    }

    fn job_path(name: &str) -> String {
        format!("job/{}", urlencoding::encode(name))
    }

    /// Map non-success responses onto the error taxonomy
    async fn check(response: Response, operation: &str, name: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                kind: "job".to_string(),
                name: name.to_string(),
            });
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::backend(
            NOMAD_BACKEND,
            operation,
            format!("HTTP {}: {}", status, body.trim()),
        ))
    }
}

#[async_trait]
impl OrchestratorBackend for NomadBackend {
    fn name(&self) -> &str {
        NOMAD_BACKEND
    }

    async fn submit(&self, job: &Job) -> Result<JobHandle> {
        debug!("Registering job {} with Nomad", job.id);
        let response = self
            .client
            .put(self.url("jobs"))
            .json(&RegisterRequest { job })
            .send()
            .await?;
        let eval: EvalResponse = Self::check(response, "submit", &job.id).await?.json().await?;

        Ok(JobHandle {
            job_id: job.id.clone(),
            eval_id: eval.eval_id,
        })
    }

    async fn read(&self, name: &str) -> Result<JobRecord> {
        let response = self.client.get(self.url(&Self::job_path(name))).send().await?;
        let body: JobResponse = Self::check(response, "read", name).await?.json().await?;

        Ok(JobRecord {
            job: body.job,
            status: body.status,
            status_description: body.status_description,
        })
    }

    async fn delete(&self, name: &str) -> Result<JobHandle> {
        debug!("Deregistering job {} from Nomad", name);
        let response = self
            .client
            .delete(self.url(&Self::job_path(name)))
            .send()
            .await?;
        let eval: EvalResponse = Self::check(response, "delete", name).await?.json().await?;

        Ok(JobHandle {
            job_id: name.to_string(),
            eval_id: eval.eval_id,
        })
    }

    async fn latest_evaluation(&self, name: &str) -> Result<Evaluation> {
        let path = format!("{}/evaluations", Self::job_path(name));
        let response = self.client.get(self.url(&path)).send().await?;
        let evals: Option<Vec<Evaluation>> =
            Self::check(response, "evaluations", name).await?.json().await?;

        evals
            .unwrap_or_default()
            .into_iter()
            .max_by_key(|e| e.create_index)
            .ok_or_else(|| Error::NotFound {
                kind: "evaluation".to_string(),
                name: name.to_string(),
            })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.get(self.url("status/leader")).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                debug!("Nomad health check failed: {}", e);
                Ok(false)
            }
        }
    }
}
