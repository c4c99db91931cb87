//! Property Resolver
//!
//! Fills a claim's missing properties from layered sources. For every
//! property the precedence is: value already on the claim, then the
//! orchestrator's datacenter-scoped default, then the built-in default.
//! Values already on the claim are never overwritten.

use crate::domain::claim::{PropertyKey, PropertyRequirement, VolumeClaim};
use crate::domain::ports::{DefaultPropertySourceRef, PropertyKind};
use crate::domain::properties::parse_replica_count;
use crate::domain::quantity::parse_positive_quantity;
use crate::error::{Error, Result};
use crate::network::{subnet_of, Ipv4Cidr};
use tracing::debug;

/// Network parameters of a resolved claim, as needed by the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedNetwork {
    pub subnet: Ipv4Cidr,
    pub replica_count: usize,
}

/// Resolves claim properties against a default-property source
#[derive(Clone)]
pub struct PropertyResolver {
    source: DefaultPropertySourceRef,
}

impl PropertyResolver {
    pub fn new(source: DefaultPropertySourceRef) -> Self {
        Self { source }
    }

    /// Name of the underlying default-property source
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Resolve every non-allocated property of a claim in place.
    ///
    /// Fails before any address is allocated when a required property is
    /// missing, a value is malformed, or explicit replica addresses disagree
    /// with the replica count. Resolving an already resolved claim changes
    /// nothing.
    pub fn resolve(&self, claim: &mut VolumeClaim) -> Result<ResolvedNetwork> {
        claim.validate_identity()?;

        if !claim.is_set(PropertyKey::Region) {
            claim.set(PropertyKey::Region, self.source.region()?);
        }
        if !claim.is_set(PropertyKey::Datacenter) {
            claim.set(PropertyKey::Datacenter, self.source.default_datacenter()?);
        }
        let datacenter = claim.require(PropertyKey::Datacenter)?.to_string();

        for kind in PropertyKind::CLAIM_KINDS {
            let Some(key) = kind.key() else { continue };
            if claim.is_set(key) {
                continue;
            }
            let value = self
                .source
                .lookup(&datacenter, kind)?
                .or_else(|| key.builtin_default().map(str::to_string));
            if let Some(value) = value {
                debug!("Volume {}: {} resolved to '{}'", claim.name, key, value);
                claim.set(key, value);
            }
        }

        if !claim.is_set(PropertyKey::StorageSize) {
            if let Some(size) = claim.storage_request().map(str::to_string) {
                claim.set(PropertyKey::StorageSize, size);
            }
        }

        if !claim.is_set(PropertyKey::SubnetCidr) {
            let network = claim.require(PropertyKey::NetworkCidr)?.to_string();
            let prefix = self
                .source
                .lookup(&datacenter, PropertyKind::SubnetPrefix)?
                .map(|p| parse_prefix(&p))
                .transpose()?;
            let subnet = subnet_of(&network, prefix)?;
            debug!("Volume {}: subnet {} derived from {}", claim.name, subnet, network);
            claim.set(PropertyKey::SubnetCidr, subnet.to_string());
        }

        validate(claim)
    }
}

impl std::fmt::Debug for PropertyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyResolver")
            .field("source", &self.source.name())
            .finish()
    }
}

/// Check a claim after resolution; allocated properties may still be absent
fn validate(claim: &VolumeClaim) -> Result<ResolvedNetwork> {
    for key in PropertyKey::ALL {
        let skip = matches!(key.requirement(), PropertyRequirement::Allocated)
            || key == PropertyKey::NetworkCidr;
        if !skip {
            claim.require(key)?;
        }
    }

    let replica_count = parse_replica_count(claim.require(PropertyKey::ReplicaCount)?)?;
    parse_positive_quantity(claim.require(PropertyKey::StorageSize)?)?;
    let subnet = Ipv4Cidr::parse(claim.require(PropertyKey::SubnetCidr)?)?;

    let explicit = claim.replica_ips()?;
    if !explicit.is_empty() && explicit.len() != replica_count {
        return Err(Error::ReplicaIpCountMismatch {
            ips: explicit.len(),
            replicas: replica_count,
        });
    }

    Ok(ResolvedNetwork {
        subnet,
        replica_count,
    })
}

fn parse_prefix(value: &str) -> Result<u8> {
    value.trim().parse().map_err(|_| Error::InvalidProperty {
        key: "subnetPrefix".into(),
        value: value.to_string(),
        reason: "not a prefix length".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatacenterDefaults, ProvisionerConfig};
    use assert_matches::assert_matches;
    use std::sync::Arc;

    const CONFIG: &str = r#"
region: global
default-datacenter: dc1
datacenters:
  dc1:
    network-cidr: 172.28.128.1/16
    subnet-prefix: 24
    interface: eth1
    controller-image: openebs/jiva:0.4.0
  bare: {}
"#;

    fn resolver() -> PropertyResolver {
        let config = ProvisionerConfig::from_yaml(CONFIG).unwrap();
        PropertyResolver::new(Arc::new(DatacenterDefaults::new("nomad", config)))
    }

    #[test]
    fn test_fills_from_datacenter_then_builtin() {
        let mut claim = VolumeClaim::new("vol1").with_storage("5Gi");
        let network = resolver().resolve(&mut claim).unwrap();

        assert_eq!(claim.get(PropertyKey::Region), Some("global"));
        assert_eq!(claim.get(PropertyKey::Datacenter), Some("dc1"));
        assert_eq!(claim.get(PropertyKey::Interface), Some("eth1"));
        assert_eq!(claim.get(PropertyKey::NetworkType), Some("host"));
        assert_eq!(claim.get(PropertyKey::ReplicaCount), Some("2"));
        assert_eq!(claim.get(PropertyKey::PersistenceLocation), Some("/tmp/"));
        assert_eq!(claim.get(PropertyKey::StorageSize), Some("5Gi"));
        assert_eq!(claim.get(PropertyKey::SubnetCidr), Some("172.28.0.0/24"));
        assert_eq!(network.replica_count, 2);
        assert_eq!(network.subnet.to_string(), "172.28.0.0/24");
    }

    #[test]
    fn test_explicit_values_never_overwritten() {
        let mut claim = VolumeClaim::new("vol1")
            .with(PropertyKey::Interface, "bond0")
            .with(PropertyKey::ReplicaCount, "3")
            .with(PropertyKey::SubnetCidr, "10.1.0.0/24")
            .with(PropertyKey::StorageSize, "1Gi")
            .with_storage("5Gi");
        let network = resolver().resolve(&mut claim).unwrap();

        assert_eq!(claim.get(PropertyKey::Interface), Some("bond0"));
        assert_eq!(claim.get(PropertyKey::ReplicaCount), Some("3"));
        assert_eq!(claim.get(PropertyKey::StorageSize), Some("1Gi"));
        assert_eq!(network.subnet.to_string(), "10.1.0.0/24");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let resolver = resolver();
        let mut claim = VolumeClaim::new("vol1").with_storage("5Gi");
        let first = resolver.resolve(&mut claim).unwrap();
        let labels = claim.labels.clone();

        let second = resolver.resolve(&mut claim).unwrap();
        assert_eq!(first, second);
        assert_eq!(claim.labels, labels);
    }

    #[test]
    fn test_missing_controller_image() {
        let mut claim = VolumeClaim::new("vol1")
            .with(PropertyKey::Datacenter, "bare")
            .with_storage("5Gi");
        assert_matches!(
            resolver().resolve(&mut claim),
            Err(Error::MissingProperty { key }) if key == "controllerImage"
        );
    }

    #[test]
    fn test_missing_storage_size() {
        let mut claim = VolumeClaim::new("vol1");
        assert_matches!(
            resolver().resolve(&mut claim),
            Err(Error::MissingProperty { key }) if key == "storageSize"
        );
    }

    #[test]
    fn test_zero_storage_rejected() {
        let mut claim = VolumeClaim::new("vol1").with_storage("0");
        assert_matches!(
            resolver().resolve(&mut claim),
            Err(Error::InvalidProperty { .. })
        );
    }

    #[test]
    fn test_explicit_replica_ips_must_match_count() {
        let mut claim = VolumeClaim::new("vol1")
            .with(PropertyKey::ReplicaCount, "3")
            .with(PropertyKey::ReplicaIps, "10.0.0.5,10.0.0.6")
            .with_storage("5Gi");
        assert_matches!(
            resolver().resolve(&mut claim),
            Err(Error::ReplicaIpCountMismatch { ips: 2, replicas: 3 })
        );
    }

    #[test]
    fn test_blank_replica_ip_entry_rejected() {
        let mut claim = VolumeClaim::new("vol1")
            .with(PropertyKey::ReplicaCount, "3")
            .with(PropertyKey::ReplicaIps, "10.0.0.5,,10.0.0.6")
            .with_storage("5Gi");
        assert_matches!(
            resolver().resolve(&mut claim),
            Err(Error::InvalidProperty { key, .. }) if key == "replicaIPs"
        );
    }

    #[test]
    fn test_unknown_datacenter() {
        let mut claim = VolumeClaim::new("vol1")
            .with(PropertyKey::Datacenter, "mars")
            .with_storage("5Gi");
        assert_matches!(
            resolver().resolve(&mut claim),
            Err(Error::UnknownDatacenter { .. })
        );
    }

    #[test]
    fn test_nameless_claim() {
        let mut claim = VolumeClaim::new("").with_storage("5Gi");
        assert_matches!(
            resolver().resolve(&mut claim),
            Err(Error::MissingProperty { key }) if key == "name"
        );
    }
}
