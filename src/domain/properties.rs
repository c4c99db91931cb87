//! Resolved Property Sets
//!
//! The typed, validated view of a fully resolved claim. Once a
//! [`PropertySet`] exists every required value is present and well formed,
//! so topology construction works on fields rather than label lookups.

use super::claim::{PropertyKey, VolumeClaim};
use super::quantity::parse_positive_quantity;
use crate::error::{Error, Result};
use crate::network::{parse_address, Ipv4Cidr, NetworkAllocation};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Fully resolved volume properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySet {
    pub name: String,
    pub region: String,
    pub datacenter: String,
    pub controller_image: String,
    pub controller_ip: Ipv4Addr,
    pub replica_ips: Vec<Ipv4Addr>,
    pub replica_count: usize,
    pub network_type: String,
    pub subnet: Ipv4Cidr,
    pub interface: String,
    pub persistence_location: String,
    pub storage_size: String,
    pub storage_bytes: u64,
}

impl PropertySet {
    /// Build from a claim that has been resolved and allocated.
    ///
    /// Fails with `MissingProperty` naming the first absent required key.
    pub fn from_claim(claim: &VolumeClaim) -> Result<Self> {
        claim.validate_identity()?;

        for key in PropertyKey::ALL {
            if key != PropertyKey::NetworkCidr {
                claim.require(key)?;
            }
        }

        let replica_count = parse_replica_count(claim.require(PropertyKey::ReplicaCount)?)?;

        let replica_ips = claim
            .replica_ips()?
            .iter()
            .map(|ip| parse_address(ip))
            .collect::<Result<Vec<_>>>()?;
        if replica_ips.len() != replica_count {
            return Err(Error::ReplicaIpCountMismatch {
                ips: replica_ips.len(),
                replicas: replica_count,
            });
        }

        let controller_ip = parse_address(claim.require(PropertyKey::ControllerIps)?)?;
        let subnet = Ipv4Cidr::parse(claim.require(PropertyKey::SubnetCidr)?)?;

        let mut seen = BTreeSet::new();
        for addr in std::iter::once(&controller_ip).chain(replica_ips.iter()) {
            if !subnet.is_usable(*addr) {
                return Err(Error::AddressOutsideSubnet {
                    address: addr.to_string(),
                    subnet: subnet.to_string(),
                });
            }
            if !seen.insert(*addr) {
                return Err(Error::AddressInUse {
                    address: addr.to_string(),
                    owner: claim.name.clone(),
                });
            }
        }

        let storage_size = claim.require(PropertyKey::StorageSize)?.to_string();
        let storage_bytes = parse_positive_quantity(&storage_size)?;

        let owned = |key: PropertyKey| -> Result<String> { Ok(claim.require(key)?.to_string()) };

        Ok(Self {
            name: claim.name.clone(),
            region: owned(PropertyKey::Region)?,
            datacenter: owned(PropertyKey::Datacenter)?,
            controller_image: owned(PropertyKey::ControllerImage)?,
            controller_ip,
            replica_ips,
            replica_count,
            network_type: owned(PropertyKey::NetworkType)?,
            subnet,
            interface: owned(PropertyKey::Interface)?,
            persistence_location: owned(PropertyKey::PersistenceLocation)?,
            storage_size,
            storage_bytes,
        })
    }

    /// The network allocation encoded in these properties
    pub fn allocation(&self) -> NetworkAllocation {
        NetworkAllocation {
            frontend_ip: self.controller_ip,
            backend_ips: self.replica_ips.clone(),
            subnet: self.subnet,
        }
    }
}

/// Parse a replica count; it must be a positive integer
pub fn parse_replica_count(value: &str) -> Result<usize> {
    let invalid = |reason: &str| Error::InvalidProperty {
        key: PropertyKey::ReplicaCount.label().to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let count: usize = value
        .trim()
        .parse()
        .map_err(|_| invalid("not an integer"))?;
    if count == 0 {
        return Err(invalid("replica count must be positive"));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn resolved_claim() -> VolumeClaim {
        VolumeClaim::new("vol1")
            .with(PropertyKey::Region, "global")
            .with(PropertyKey::Datacenter, "dc1")
            .with(PropertyKey::ControllerImage, "openebs/jiva:0.4.0")
            .with(PropertyKey::ControllerIps, "10.0.0.1")
            .with(PropertyKey::ReplicaIps, "10.0.0.5,10.0.0.6")
            .with(PropertyKey::ReplicaCount, "2")
            .with(PropertyKey::NetworkType, "host")
            .with(PropertyKey::SubnetCidr, "10.0.0.0/24")
            .with(PropertyKey::Interface, "eth0")
            .with(PropertyKey::PersistenceLocation, "/var/vol/")
            .with(PropertyKey::StorageSize, "5Gi")
    }

    #[test]
    fn test_from_resolved_claim() {
        let props = PropertySet::from_claim(&resolved_claim()).unwrap();
        assert_eq!(props.replica_count, 2);
        assert_eq!(props.controller_ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(props.replica_ips.len(), 2);
        assert_eq!(props.subnet.to_string(), "10.0.0.0/24");
        assert_eq!(props.storage_bytes, 5 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_first_missing_key_is_named() {
        let mut claim = resolved_claim();
        claim.labels.remove("controllerImage");
        claim.labels.remove("interface");
        assert_matches!(
            PropertySet::from_claim(&claim),
            Err(Error::MissingProperty { key }) if key == "controllerImage"
        );
    }

    #[test]
    fn test_replica_count_must_be_positive_integer() {
        assert_eq!(parse_replica_count("3").unwrap(), 3);
        assert_matches!(parse_replica_count("0"), Err(Error::InvalidProperty { .. }));
        assert_matches!(parse_replica_count("two"), Err(Error::InvalidProperty { .. }));
    }

    #[test]
    fn test_mismatched_replica_ips() {
        let claim = resolved_claim().with(PropertyKey::ReplicaCount, "3");
        assert_matches!(
            PropertySet::from_claim(&claim),
            Err(Error::ReplicaIpCountMismatch { ips: 2, replicas: 3 })
        );
    }

    #[test]
    fn test_duplicate_addresses_rejected() {
        let claim = resolved_claim().with(PropertyKey::ReplicaIps, "10.0.0.1,10.0.0.6");
        assert_matches!(
            PropertySet::from_claim(&claim),
            Err(Error::AddressInUse { .. })
        );
    }
}
