//! Provisioner Configuration
//!
//! Datacenter-scoped defaults loaded from a YAML file. A sample:
//!
//! ```yaml
//! region: global
//! default-datacenter: dc1
//! datacenters:
//!   dc1:
//!     address: http://20.0.0.2:4646
//!     network-type: host
//!     network-cidr: 172.28.128.1/24
//!     interface: enp0s8
//!     persistence-location: /tmp/
//!     replica-count: "2"
//!     controller-image: openebs/jiva:0.4.0
//! ```

use crate::domain::claim::PropertyKey;
use crate::domain::ports::{DefaultPropertySource, PropertyKind};
use crate::domain::properties::parse_replica_count;
use crate::error::{Error, Result};
use crate::network::Ipv4Cidr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

// =============================================================================
// Configuration Types
// =============================================================================

/// Settings of one datacenter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DatacenterConfig {
    /// Orchestrator API address serving this datacenter
    pub address: Option<String>,
    /// Host networking or otherwise
    pub network_type: Option<String>,
    /// Range addresses are drawn from
    pub network_cidr: Option<String>,
    /// Prefix length of the subnet carved from `network_cidr`
    pub subnet_prefix: Option<u8>,
    /// Interface available on every host
    pub interface: Option<String>,
    /// Backing directory replicas persist into
    pub persistence_location: Option<String>,
    /// Default number of replicas
    pub replica_count: Option<String>,
    /// Default controller/replica image
    pub controller_image: Option<String>,
}

/// Whole-process provisioner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProvisionerConfig {
    pub region: String,
    pub default_datacenter: String,
    pub datacenters: BTreeMap<String, DatacenterConfig>,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            region: "global".to_string(),
            default_datacenter: "dc1".to_string(),
            datacenters: BTreeMap::from([("dc1".to_string(), DatacenterConfig::default())]),
        }
    }
}

impl ProvisionerConfig {
    /// Parse and validate YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ProvisionerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&raw)?;
        info!(
            "Loaded provisioner config from {} ({} datacenters)",
            path.display(),
            config.datacenters.len()
        );
        Ok(config)
    }

    /// Reject values that could never resolve
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(Error::Configuration("region is empty".into()));
        }
        if !self.datacenters.contains_key(&self.default_datacenter) {
            return Err(Error::Configuration(format!(
                "default datacenter '{}' is not configured",
                self.default_datacenter
            )));
        }

        for (name, dc) in &self.datacenters {
            if let Some(count) = &dc.replica_count {
                parse_replica_count(count).map_err(|e| {
                    Error::Configuration(format!("datacenter '{}': {}", name, e))
                })?;
            }
            if let Some(cidr) = &dc.network_cidr {
                let network = Ipv4Cidr::parse(cidr).map_err(|e| {
                    Error::Configuration(format!("datacenter '{}': {}", name, e))
                })?;
                if let Some(prefix) = dc.subnet_prefix {
                    network.subnet(prefix).map_err(|e| {
                        Error::Configuration(format!("datacenter '{}': {}", name, e))
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Orchestrator address of a datacenter, if configured
    pub fn address(&self, datacenter: &str) -> Option<&str> {
        self.datacenters
            .get(datacenter)
            .and_then(|dc| dc.address.as_deref())
    }
}

// =============================================================================
// Datacenter Defaults
// =============================================================================

/// Default-property source backed by [`ProvisionerConfig`].
///
/// Unset values fall back to the built-in defaults of their property.
#[derive(Debug, Clone)]
pub struct DatacenterDefaults {
    name: String,
    config: ProvisionerConfig,
}

impl DatacenterDefaults {
    pub fn new(name: impl Into<String>, config: ProvisionerConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }
}

impl DefaultPropertySource for DatacenterDefaults {
    fn name(&self) -> &str {
        &self.name
    }

    fn region(&self) -> Result<String> {
        Ok(self.config.region.clone())
    }

    fn default_datacenter(&self) -> Result<String> {
        Ok(self.config.default_datacenter.clone())
    }

    fn lookup(&self, datacenter: &str, kind: PropertyKind) -> Result<Option<String>> {
        let dc = self
            .config
            .datacenters
            .get(datacenter)
            .ok_or_else(|| Error::UnknownDatacenter {
                datacenter: datacenter.to_string(),
            })?;

        let configured = match kind {
            PropertyKind::NetworkType => dc.network_type.clone(),
            PropertyKind::NetworkCidr => dc.network_cidr.clone(),
            PropertyKind::SubnetPrefix => dc.subnet_prefix.map(|p| p.to_string()),
            PropertyKind::Interface => dc.interface.clone(),
            PropertyKind::PersistenceLocation => dc.persistence_location.clone(),
            PropertyKind::ReplicaCount => dc.replica_count.clone(),
            PropertyKind::ControllerImage => dc.controller_image.clone(),
        }
        .filter(|v| !v.trim().is_empty());

        Ok(configured.or_else(|| {
            kind.key()
                .and_then(PropertyKey::builtin_default)
                .map(str::to_string)
        }))
    }
}
