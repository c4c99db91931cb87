//! Job Topology Types
//!
//! The concrete workload definition submitted to an orchestrator. Field
//! names serialise in the orchestrator's JSON casing so the same value can
//! be posted as-is and read back from job queries.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// =============================================================================
// Job
// =============================================================================

/// A volume's full workload: one frontend group and one replica group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Job {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub region: String,
    #[serde(deserialize_with = "null_default")]
    pub datacenters: Vec<String>,
    #[serde(rename = "Type")]
    pub job_type: String,
    pub priority: i32,
    #[serde(deserialize_with = "null_default")]
    pub constraints: Vec<Constraint>,
    /// Durable record of values needed to reconstruct connection info
    #[serde(deserialize_with = "null_default")]
    pub meta: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_default")]
    pub task_groups: Vec<TaskGroup>,
}

impl Job {
    /// Find a task group by name
    pub fn task_group(&self, name: &str) -> Option<&TaskGroup> {
        self.task_groups.iter().find(|g| g.name == name)
    }
}

/// Placement rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraint {
    #[serde(rename = "LTarget")]
    pub l_target: String,
    #[serde(rename = "Operand")]
    pub operand: String,
    #[serde(rename = "RTarget")]
    pub r_target: String,
}

impl Constraint {
    pub fn new(
        l_target: impl Into<String>,
        operand: impl Into<String>,
        r_target: impl Into<String>,
    ) -> Self {
        Self {
            l_target: l_target.into(),
            operand: operand.into(),
            r_target: r_target.into(),
        }
    }

    /// At most one instance of the group per host
    pub fn distinct_hosts() -> Self {
        Self::new("", DISTINCT_HOSTS, "true")
    }

    pub fn is_distinct_hosts(&self) -> bool {
        self.operand == DISTINCT_HOSTS && self.r_target == "true"
    }
}

/// Operand of the anti-affinity constraint
pub const DISTINCT_HOSTS: &str = "distinct_hosts";

// =============================================================================
// Task Group
// =============================================================================

/// A set of identical instances scheduled together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskGroup {
    pub name: String,
    pub count: usize,
    #[serde(deserialize_with = "null_default")]
    pub constraints: Vec<Constraint>,
    pub restart_policy: RestartPolicy,
    #[serde(deserialize_with = "null_default")]
    pub tasks: Vec<Task>,
}

impl TaskGroup {
    pub fn has_distinct_hosts(&self) -> bool {
        self.constraints.iter().any(Constraint::is_distinct_hosts)
    }
}

/// Bounded restarts within a rolling window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RestartPolicy {
    pub attempts: u32,
    #[serde(with = "duration_nanos")]
    pub interval: Duration,
    #[serde(with = "duration_nanos")]
    pub delay: Duration,
    pub mode: String,
}

// =============================================================================
// Task
// =============================================================================

/// A single process within a group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Task {
    pub name: String,
    pub driver: String,
    pub resources: Resources,
    #[serde(deserialize_with = "null_default")]
    pub env: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_default")]
    pub artifacts: Vec<TaskArtifact>,
    #[serde(deserialize_with = "null_default")]
    pub config: BTreeMap<String, serde_json::Value>,
    pub log_config: LogConfig,
}

/// Per-task resource request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    #[serde(rename = "CPU")]
    pub cpu: u32,
    #[serde(rename = "MemoryMB")]
    pub memory_mb: u32,
    #[serde(rename = "Networks", deserialize_with = "null_default")]
    pub networks: Vec<NetworkResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkResource {
    #[serde(rename = "MBits")]
    pub mbits: u32,
}

/// File fetched into the task directory before start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskArtifact {
    pub getter_source: String,
    pub relative_dest: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    #[serde(rename = "MaxFiles")]
    pub max_files: u32,
    #[serde(rename = "MaxFileSizeMB")]
    pub max_file_size_mb: u32,
}

// =============================================================================
// Serde helpers
// =============================================================================

/// Orchestrators send `null` for empty collections
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Durations travel as integer nanoseconds
mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(d)?))
    }
}
