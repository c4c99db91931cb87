//! Status Reconciler
//!
//! Maps orchestrator records back into a uniform [`VolumeStatus`]. A job
//! observed running reports its own metadata; anything else reports the
//! latest evaluation.

use crate::domain::ports::{Evaluation, JobRecord, JobStatus};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ANNOTATION_EVAL_PRIORITY: &str = "evalpriority";
pub const ANNOTATION_EVAL_TYPE: &str = "evaltype";
pub const ANNOTATION_EVAL_TRIGGER: &str = "evaltrigger";
pub const ANNOTATION_EVAL_JOB: &str = "evaljob";
pub const ANNOTATION_EVAL_STATUS: &str = "evalstatus";
pub const ANNOTATION_EVAL_STATUS_DESC: &str = "evalstatusdesc";
pub const ANNOTATION_EVAL_BLOCKED: &str = "evalblockedeval";

/// Derived status of a volume; recomputed on every query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeStatus {
    pub name: String,
    pub message: String,
    pub reason: String,
    pub annotations: BTreeMap<String, String>,
}

/// Stateless mapping from orchestrator records to volume status
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusReconciler;

impl StatusReconciler {
    /// Evaluation-sourced status. Every field is stringified.
    pub fn from_evaluation(name: &str, eval: &Evaluation) -> VolumeStatus {
        let annotations = BTreeMap::from([
            (ANNOTATION_EVAL_PRIORITY.to_string(), eval.priority.to_string()),
            (ANNOTATION_EVAL_TYPE.to_string(), eval.eval_type.clone()),
            (ANNOTATION_EVAL_TRIGGER.to_string(), eval.triggered_by.clone()),
            (ANNOTATION_EVAL_JOB.to_string(), eval.job_id.clone()),
            (ANNOTATION_EVAL_STATUS.to_string(), eval.status.clone()),
            (
                ANNOTATION_EVAL_STATUS_DESC.to_string(),
                eval.status_description.clone(),
            ),
            (
                ANNOTATION_EVAL_BLOCKED.to_string(),
                eval.blocked_eval.clone().unwrap_or_default(),
            ),
        ]);

        VolumeStatus {
            name: name.to_string(),
            message: eval.status_description.clone(),
            reason: eval.status.clone(),
            annotations,
        }
    }

    /// Job-sourced status; metadata becomes the annotations only while running
    pub fn from_job(record: &JobRecord) -> VolumeStatus {
        let annotations = if record.status == JobStatus::Running {
            record.job.meta.clone()
        } else {
            BTreeMap::new()
        };

        VolumeStatus {
            name: record.job.name.clone(),
            message: record.status_description.clone(),
            reason: record.status.to_string(),
            annotations,
        }
    }

    /// Whether a job's status is reported from its own metadata
    pub fn uses_job_metadata(record: &JobRecord) -> bool {
        record.status == JobStatus::Running
    }

    /// Pick the status form for a job given its latest evaluation.
    ///
    /// A job that is not running needs an evaluation to report.
    pub fn reconcile(record: &JobRecord, eval: Option<&Evaluation>) -> Result<VolumeStatus> {
        if Self::uses_job_metadata(record) {
            return Ok(Self::from_job(record));
        }
        eval.map(|e| Self::from_evaluation(&record.job.name, e))
            .ok_or_else(|| Error::NotFound {
                kind: "evaluation".into(),
                name: record.job.name.clone(),
            })
    }
}
