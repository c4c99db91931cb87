//! Volume Claims
//!
//! A claim is the request boundary's description of a volume: a name, a set
//! of string properties, and resource requests. Recognised properties are
//! enumerated by [`PropertyKey`]; anything else on the claim is carried along
//! untouched.

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Resource request name holding the volume size
pub const STORAGE_RESOURCE: &str = "storage";

// =============================================================================
// Property Keys
// =============================================================================

/// How a property obtains its value when the claim does not carry one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyRequirement {
    /// Must come from the claim or the orchestrator; no fallback
    Required,
    /// Falls back to a built-in value after orchestrator defaults
    Defaulted(&'static str),
    /// Filled by the network allocator
    Allocated,
    /// Computed from other properties
    Derived,
}

/// Every property the provisioner recognises on a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyKey {
    Region,
    Datacenter,
    ControllerImage,
    ControllerIps,
    ReplicaIps,
    ReplicaCount,
    NetworkType,
    NetworkCidr,
    SubnetCidr,
    Interface,
    PersistenceLocation,
    StorageSize,
}

impl PropertyKey {
    /// All recognised keys, in resolution order
    pub const ALL: [PropertyKey; 12] = [
        PropertyKey::Region,
        PropertyKey::Datacenter,
        PropertyKey::ControllerImage,
        PropertyKey::ControllerIps,
        PropertyKey::ReplicaIps,
        PropertyKey::ReplicaCount,
        PropertyKey::NetworkType,
        PropertyKey::NetworkCidr,
        PropertyKey::SubnetCidr,
        PropertyKey::Interface,
        PropertyKey::PersistenceLocation,
        PropertyKey::StorageSize,
    ];

    /// Label under which the property is stored on a claim
    pub fn label(self) -> &'static str {
        match self {
            PropertyKey::Region => "region",
            PropertyKey::Datacenter => "datacenter",
            PropertyKey::ControllerImage => "controllerImage",
            PropertyKey::ControllerIps => "controllerIPs",
            PropertyKey::ReplicaIps => "replicaIPs",
            PropertyKey::ReplicaCount => "replicaCount",
            PropertyKey::NetworkType => "networkType",
            PropertyKey::NetworkCidr => "networkCIDR",
            PropertyKey::SubnetCidr => "subnetCIDR",
            PropertyKey::Interface => "interface",
            PropertyKey::PersistenceLocation => "persistenceLocation",
            PropertyKey::StorageSize => "storageSize",
        }
    }

    /// Declared fallback behaviour of the property
    pub fn requirement(self) -> PropertyRequirement {
        match self {
            PropertyKey::Region
            | PropertyKey::Datacenter
            | PropertyKey::ControllerImage
            | PropertyKey::StorageSize => PropertyRequirement::Required,
            PropertyKey::ControllerIps | PropertyKey::ReplicaIps => PropertyRequirement::Allocated,
            PropertyKey::SubnetCidr => PropertyRequirement::Derived,
            PropertyKey::ReplicaCount => PropertyRequirement::Defaulted("2"),
            PropertyKey::NetworkType => PropertyRequirement::Defaulted("host"),
            PropertyKey::NetworkCidr => PropertyRequirement::Defaulted("172.28.128.0/24"),
            PropertyKey::Interface => PropertyRequirement::Defaulted("enp0s8"),
            PropertyKey::PersistenceLocation => PropertyRequirement::Defaulted("/tmp/"),
        }
    }

    /// Built-in hard default, if the property has one
    pub fn builtin_default(self) -> Option<&'static str> {
        match self.requirement() {
            PropertyRequirement::Defaulted(value) => Some(value),
            _ => None,
        }
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for PropertyKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PropertyKey::ALL
            .iter()
            .copied()
            .find(|key| key.label() == s)
            .ok_or_else(|| Error::InvalidProperty {
                key: s.to_string(),
                value: String::new(),
                reason: "unrecognised property".into(),
            })
    }
}

// =============================================================================
// Volume Claim
// =============================================================================

/// A request for a replicated block volume
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaim {
    /// Volume name; also the topology identity
    pub name: String,
    /// String properties, keyed by [`PropertyKey::label`] for recognised ones
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Resource requests (at least `storage`)
    #[serde(default)]
    pub resources: BTreeMap<String, Quantity>,
}

impl VolumeClaim {
    /// Create an empty claim for a volume
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style property setter
    pub fn with(mut self, key: PropertyKey, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder-style storage request setter
    pub fn with_storage(mut self, size: impl Into<String>) -> Self {
        self.resources
            .insert(STORAGE_RESOURCE.to_string(), Quantity(size.into()));
        self
    }

    /// Ensure the claim has an identity
    pub fn validate_identity(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::missing("name"));
        }
        Ok(())
    }

    /// Get a property; empty strings count as absent
    pub fn get(&self, key: PropertyKey) -> Option<&str> {
        self.labels
            .get(key.label())
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Get a property or fail naming the key
    pub fn require(&self, key: PropertyKey) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::missing(key.label()))
    }

    /// Whether the property carries a non-empty value
    pub fn is_set(&self, key: PropertyKey) -> bool {
        self.get(key).is_some()
    }

    /// Set a property, replacing any previous value
    pub fn set(&mut self, key: PropertyKey, value: impl Into<String>) {
        self.labels.insert(key.label().to_string(), value.into());
    }

    /// Set a property only if it is absent. Returns whether it was set.
    pub fn set_if_absent(&mut self, key: PropertyKey, value: impl Into<String>) -> bool {
        if self.is_set(key) {
            return false;
        }
        self.set(key, value);
        true
    }

    /// The `storage` resource request, if any
    pub fn storage_request(&self) -> Option<&str> {
        self.resources
            .get(STORAGE_RESOURCE)
            .map(|q| q.0.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Replica addresses as listed on the claim, in order
    pub fn replica_ips(&self) -> Result<Vec<String>> {
        match self.get(PropertyKey::ReplicaIps) {
            Some(value) => split_list(PropertyKey::ReplicaIps, value),
            None => Ok(Vec::new()),
        }
    }
}

/// Split a comma-separated property value. Every element must be non-blank.
pub fn split_list(key: PropertyKey, value: &str) -> Result<Vec<String>> {
    value
        .split(',')
        .map(str::trim)
        .map(|v| match v.is_empty() {
            true => Err(Error::InvalidProperty {
                key: key.label().to_string(),
                value: value.to_string(),
                reason: "empty list element".into(),
            }),
            false => Ok(v.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for key in PropertyKey::ALL {
            assert_eq!(key.label().parse::<PropertyKey>().unwrap(), key);
        }
        assert!("bogus".parse::<PropertyKey>().is_err());
    }

    #[test]
    fn test_builtin_defaults() {
        assert_eq!(PropertyKey::ReplicaCount.builtin_default(), Some("2"));
        assert_eq!(PropertyKey::NetworkType.builtin_default(), Some("host"));
        assert_eq!(PropertyKey::ControllerImage.builtin_default(), None);
        assert_eq!(PropertyKey::ReplicaIps.builtin_default(), None);
    }

    #[test]
    fn test_empty_values_are_absent() {
        let mut claim = VolumeClaim::new("vol1").with(PropertyKey::Region, "  ");
        assert!(!claim.is_set(PropertyKey::Region));
        assert!(claim.set_if_absent(PropertyKey::Region, "global"));
        assert!(!claim.set_if_absent(PropertyKey::Region, "other"));
        assert_eq!(claim.get(PropertyKey::Region), Some("global"));
    }

    #[test]
    fn test_replica_ips_split() {
        let claim = VolumeClaim::new("vol1").with(PropertyKey::ReplicaIps, "10.0.0.5, 10.0.0.6");
        assert_eq!(claim.replica_ips().unwrap(), vec!["10.0.0.5", "10.0.0.6"]);
        assert!(VolumeClaim::new("vol1").replica_ips().unwrap().is_empty());
    }

    #[test]
    fn test_blank_list_element_rejected() {
        for value in ["10.0.0.5,,10.0.0.6", "10.0.0.5,10.0.0.6,", ",10.0.0.5"] {
            let claim = VolumeClaim::new("vol1").with(PropertyKey::ReplicaIps, value);
            assert!(
                matches!(
                    claim.replica_ips(),
                    Err(Error::InvalidProperty { ref key, .. }) if key == "replicaIPs"
                ),
                "{} accepted",
                value
            );
        }
    }

    #[test]
    fn test_claim_deserializes_from_json() {
        let claim: VolumeClaim = serde_json::from_str(
            r#"{"name":"vol1","labels":{"replicaCount":"2"},"resources":{"storage":"5Gi"}}"#,
        )
        .unwrap();
        assert_eq!(claim.name, "vol1");
        assert_eq!(claim.get(PropertyKey::ReplicaCount), Some("2"));
        assert_eq!(claim.storage_request(), Some("5Gi"));
    }

    #[test]
    fn test_nameless_claim_rejected() {
        assert!(VolumeClaim::new("").validate_identity().is_err());
        assert!(VolumeClaim::new("vol1").validate_identity().is_ok());
    }
}
