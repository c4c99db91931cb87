//! Topology Builder
//!
//! Turns resolved volume properties and their address allocation into the
//! job an orchestrator runs: a single frontend (controller) instance and a
//! replica group spread one-per-host.

use super::job::{
    Constraint, Job, LogConfig, NetworkResource, Resources, RestartPolicy, Task, TaskArtifact,
    TaskGroup,
};
use crate::domain::properties::PropertySet;
use crate::error::{Error, Result};
use crate::network::NetworkAllocation;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

/// Frontend task name
pub const FRONTEND_TASK: &str = "fe";
/// Replica task name
pub const BACKEND_TASK: &str = "be";

/// Job metadata keys
pub const META_TARGET_PORTAL: &str = "targetPortal";
pub const META_IQN: &str = "iqn";
pub const META_FRONTEND_IP: &str = "frontendIP";
pub const META_BACKEND_VOL_SIZE: &str = "backendVolSize";
pub const META_REPLICA_COUNT: &str = "replicaCount";
pub const META_REPLICA_IP_PREFIX: &str = "replicaIP";

/// Environment key prefix for per-replica addresses
pub const ENV_REPLICA_IP_PREFIX: &str = "REP_IP_";

// =============================================================================
// Configuration
// =============================================================================

/// Fixed, per-deployment shape of every topology
#[derive(Debug, Clone)]
pub struct TopologyConfig {
    /// Suffix of both task group names
    pub group_name: String,
    /// Job priority
    pub priority: i32,
    /// Orchestrator placeholder replaced by each instance's index
    pub index_placeholder: String,
    /// iSCSI qualified name prefix; the volume name is appended
    pub iqn_prefix: String,
    /// Port the frontend serves the target on
    pub target_port: u16,
    /// Script fetched by the frontend task
    pub frontend_artifact: String,
    /// Script fetched by each replica task
    pub backend_artifact: String,
    /// Task driver
    pub driver: String,
    /// Per-task CPU in MHz
    pub cpu_mhz: u32,
    /// Per-task memory in MB
    pub memory_mb: u32,
    /// Per-task network bandwidth in Mbit/s
    pub network_mbits: u32,
    /// Shared by both groups
    pub restart_policy: RestartPolicy,
    /// Log rotation
    pub log_config: LogConfig,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            group_name: "vol-pod".to_string(),
            priority: 50,
            index_placeholder: "${NOMAD_ALLOC_INDEX}".to_string(),
            iqn_prefix: "iqn.2016-09.com.openebs.jiva".to_string(),
            target_port: 3260,
            frontend_artifact:
                "https://raw.githubusercontent.com/openebs/jiva/master/scripts/launch-jiva-ctl-with-ip"
                    .to_string(),
            backend_artifact:
                "https://raw.githubusercontent.com/openebs/jiva/master/scripts/launch-jiva-rep-with-ip"
                    .to_string(),
            driver: "raw_exec".to_string(),
            cpu_mhz: 50,
            memory_mb: 50,
            network_mbits: 50,
            restart_policy: RestartPolicy {
                attempts: 3,
                interval: Duration::from_secs(5 * 60),
                delay: Duration::from_secs(25),
                mode: "delay".to_string(),
            },
            log_config: LogConfig {
                max_files: 3,
                max_file_size_mb: 1,
            },
        }
    }
}

impl TopologyConfig {
    pub fn frontend_group(&self) -> String {
        format!("{}-{}", FRONTEND_TASK, self.group_name)
    }

    pub fn backend_group(&self) -> String {
        format!("{}-{}", BACKEND_TASK, self.group_name)
    }
}

// =============================================================================
// Topology Builder
// =============================================================================

/// Builds volume jobs
#[derive(Debug, Clone, Default)]
pub struct TopologyBuilder {
    config: TopologyConfig,
}

impl TopologyBuilder {
    pub fn new(config: TopologyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// Build the job for a volume
    pub fn build(&self, props: &PropertySet, allocation: &NetworkAllocation) -> Result<Job> {
        Self::check_inputs(props, allocation)?;

        let name = props.name.as_str();
        let index = self.config.index_placeholder.as_str();
        let frontend_ip = allocation.frontend_ip.to_string();
        let subnet_prefix = allocation.subnet.prefix().to_string();

        let mut meta = BTreeMap::from([
            (META_BACKEND_VOL_SIZE.to_string(), props.storage_size.clone()),
            (META_FRONTEND_IP.to_string(), frontend_ip.clone()),
            (
                META_TARGET_PORTAL.to_string(),
                format!("{}:{}", frontend_ip, self.config.target_port),
            ),
            (
                META_IQN.to_string(),
                format!("{}:{}", self.config.iqn_prefix, name),
            ),
            (
                META_REPLICA_COUNT.to_string(),
                allocation.backend_ips.len().to_string(),
            ),
        ]);

        let fe_env = BTreeMap::from([
            ("CTL_NAME".to_string(), format!("{}-{}{}", name, FRONTEND_TASK, index)),
            ("CTL_VERSION".to_string(), props.controller_image.clone()),
            ("CTL_VOLNAME".to_string(), name.to_string()),
            ("CTL_VOLSIZE".to_string(), props.storage_size.clone()),
            ("CTL_IP".to_string(), frontend_ip.clone()),
            ("CTL_SUBNET".to_string(), subnet_prefix.clone()),
            ("CTL_IFACE".to_string(), props.interface.clone()),
        ]);

        let mut be_env = BTreeMap::from([
            ("ALLOC_INDEX".to_string(), index.to_string()),
            ("REP_NAME".to_string(), format!("{}-{}{}", name, BACKEND_TASK, index)),
            ("CTL_IP".to_string(), frontend_ip),
            ("REP_VOLNAME".to_string(), name.to_string()),
            ("REP_VOLSIZE".to_string(), props.storage_size.clone()),
            (
                "REP_VOLSTORE".to_string(),
                replica_store_path(&props.persistence_location, name, index),
            ),
            ("REP_VERSION".to_string(), props.controller_image.clone()),
            ("REP_NETWORK".to_string(), props.network_type.clone()),
            ("REP_IFACE".to_string(), props.interface.clone()),
            ("REP_SUBNET".to_string(), subnet_prefix),
        ]);

        for (i, ip) in allocation.backend_ips.iter().enumerate() {
            be_env.insert(format!("{}{}", ENV_REPLICA_IP_PREFIX, i), ip.to_string());
            meta.insert(format!("{}{}", META_REPLICA_IP_PREFIX, i), ip.to_string());
        }

        let frontend = TaskGroup {
            name: self.config.frontend_group(),
            count: 1,
            constraints: Vec::new(),
            restart_policy: self.config.restart_policy.clone(),
            tasks: vec![self.task(FRONTEND_TASK, fe_env, &self.config.frontend_artifact)],
        };

        let backend = TaskGroup {
            name: self.config.backend_group(),
            count: allocation.backend_ips.len(),
            // Replicas of one volume must survive a single host failure
            constraints: vec![Constraint::distinct_hosts()],
            restart_policy: self.config.restart_policy.clone(),
            tasks: vec![self.task(BACKEND_TASK, be_env, &self.config.backend_artifact)],
        };

        debug!(
            "Built topology for {}: 1 frontend, {} replicas",
            name, backend.count
        );

        Ok(Job {
            id: name.to_string(),
            name: name.to_string(),
            region: props.region.clone(),
            datacenters: vec![props.datacenter.clone()],
            job_type: "service".to_string(),
            priority: self.config.priority,
            constraints: vec![Constraint::new("${attr.kernel.name}", "=", "linux")],
            meta,
            task_groups: vec![frontend, backend],
        })
    }

    fn task(&self, name: &str, env: BTreeMap<String, String>, artifact: &str) -> Task {
        let command = artifact.rsplit('/').next().unwrap_or(artifact).to_string();

        Task {
            name: name.to_string(),
            driver: self.config.driver.clone(),
            resources: Resources {
                cpu: self.config.cpu_mhz,
                memory_mb: self.config.memory_mb,
                networks: vec![NetworkResource {
                    mbits: self.config.network_mbits,
                }],
            },
            env,
            artifacts: vec![TaskArtifact {
                getter_source: artifact.to_string(),
                relative_dest: "local/".to_string(),
            }],
            config: BTreeMap::from([("command".to_string(), serde_json::Value::String(command))]),
            log_config: self.config.log_config.clone(),
        }
    }

    fn check_inputs(props: &PropertySet, allocation: &NetworkAllocation) -> Result<()> {
        let required = [
            ("name", props.name.as_str()),
            ("region", props.region.as_str()),
            ("datacenter", props.datacenter.as_str()),
            ("controllerImage", props.controller_image.as_str()),
            ("networkType", props.network_type.as_str()),
            ("interface", props.interface.as_str()),
            ("persistenceLocation", props.persistence_location.as_str()),
            ("storageSize", props.storage_size.as_str()),
        ];
        if let Some((key, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(Error::IncompleteSpec(format!("{} is empty", key)));
        }

        if props.replica_count == 0 || allocation.backend_ips.is_empty() {
            return Err(Error::IncompleteSpec("no replicas allocated".into()));
        }

        if allocation.backend_ips.len() != props.replica_count {
            return Err(Error::IncompleteSpec(format!(
                "{} replica addresses for replica count {}",
                allocation.backend_ips.len(),
                props.replica_count
            )));
        }

        Ok(())
    }
}

/// Storage directory of one replica instance
pub fn replica_store_path(location: &str, volume: &str, index: &str) -> String {
    let base = location.trim_end_matches('/');
    format!("{}/{}/{}{}", base, volume, BACKEND_TASK, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Ipv4Cidr;
    use assert_matches::assert_matches;
    use std::net::Ipv4Addr;

    fn props(replicas: usize) -> PropertySet {
        PropertySet {
            name: "vol1".into(),
            region: "global".into(),
            datacenter: "dc1".into(),
            controller_image: "openebs/jiva:0.4.0".into(),
            controller_ip: Ipv4Addr::new(10, 0, 0, 1),
            replica_ips: (0..replicas)
                .map(|i| Ipv4Addr::new(10, 0, 0, 5 + i as u8))
                .collect(),
            replica_count: replicas,
            network_type: "host".into(),
            subnet: Ipv4Cidr::parse("10.0.0.0/24").unwrap(),
            interface: "eth0".into(),
            persistence_location: "/var/vol/".into(),
            storage_size: "5Gi".into(),
            storage_bytes: 5 << 30,
        }
    }

    fn build(replicas: usize) -> Job {
        let props = props(replicas);
        TopologyBuilder::default()
            .build(&props, &props.allocation())
            .unwrap()
    }

    #[test]
    fn test_group_counts_and_anti_affinity() {
        let job = build(2);
        let config = TopologyConfig::default();

        let fe = job.task_group(&config.frontend_group()).unwrap();
        let be = job.task_group(&config.backend_group()).unwrap();

        assert_eq!(fe.count, 1);
        assert!(!fe.has_distinct_hosts());
        assert_eq!(be.count, 2);
        assert!(be.has_distinct_hosts());
        assert_eq!(fe.restart_policy, be.restart_policy);
        assert_eq!(be.restart_policy.attempts, 3);
    }

    #[test]
    fn test_metadata_records_connection_info() {
        let job = build(2);

        assert_eq!(job.id, "vol1");
        assert_eq!(job.meta[META_TARGET_PORTAL], "10.0.0.1:3260");
        assert_eq!(job.meta[META_IQN], "iqn.2016-09.com.openebs.jiva:vol1");
        assert_eq!(job.meta[META_BACKEND_VOL_SIZE], "5Gi");
        assert_eq!(job.meta[META_REPLICA_COUNT], "2");
        assert_eq!(job.meta["replicaIP0"], "10.0.0.5");
        assert_eq!(job.meta["replicaIP1"], "10.0.0.6");
        assert!(!job.meta.contains_key("replicaIP2"));
    }

    #[test]
    fn test_environment_carries_index_placeholder() {
        let job = build(3);
        let fe = &job.task_groups[0].tasks[0];
        let be = &job.task_groups[1].tasks[0];

        assert_eq!(fe.env["CTL_NAME"], "vol1-fe${NOMAD_ALLOC_INDEX}");
        assert_eq!(fe.env["CTL_IP"], "10.0.0.1");
        assert_eq!(fe.env["CTL_SUBNET"], "24");
        assert_eq!(be.env["REP_NAME"], "vol1-be${NOMAD_ALLOC_INDEX}");
        assert_eq!(be.env["REP_VOLSTORE"], "/var/vol/vol1/be${NOMAD_ALLOC_INDEX}");
        assert_eq!(be.env["REP_IP_2"], "10.0.0.7");
        assert_eq!(be.env["CTL_IP"], "10.0.0.1");
    }

    #[test]
    fn test_flat_resources_and_artifacts() {
        let job = build(1);
        for group in &job.task_groups {
            let task = &group.tasks[0];
            assert_eq!(task.resources.cpu, 50);
            assert_eq!(task.resources.memory_mb, 50);
            assert_eq!(task.resources.networks[0].mbits, 50);
            assert_eq!(task.artifacts[0].relative_dest, "local/");
        }
        assert_eq!(
            job.task_groups[1].tasks[0].config["command"],
            "launch-jiva-rep-with-ip"
        );
    }

    #[test]
    fn test_inconsistent_allocation_is_incomplete() {
        let props = props(2);
        let mut allocation = props.allocation();
        allocation.backend_ips.pop();

        assert_matches!(
            TopologyBuilder::default().build(&props, &allocation),
            Err(Error::IncompleteSpec(_))
        );
    }

    #[test]
    fn test_empty_field_is_incomplete() {
        let mut props = props(1);
        props.controller_image.clear();
        assert_matches!(
            TopologyBuilder::default().build(&props, &props.allocation()),
            Err(Error::IncompleteSpec(msg)) if msg.contains("controllerImage")
        );
    }

    #[test]
    fn test_replica_store_path_joins_cleanly() {
        assert_eq!(replica_store_path("/tmp/", "v", "0"), "/tmp/v/be0");
        assert_eq!(replica_store_path("/data", "v", "1"), "/data/v/be1");
    }
}
