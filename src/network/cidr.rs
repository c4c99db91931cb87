//! IPv4 CIDR arithmetic
//!
//! Parsing, subnet derivation and host-range iteration for the address
//! ranges that volumes draw their frontend and replica addresses from.

use crate::error::{Error, Result};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network in CIDR notation, always stored normalised
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Build from an address and prefix length, clearing host bits
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::InvalidCidr {
                cidr: format!("{}/{}", addr, prefix),
                reason: "prefix length exceeds 32".into(),
            });
        }
        let network = Ipv4Addr::from(u32::from(addr) & mask(prefix));
        Ok(Self { network, prefix })
    }

    /// Parse `a.b.c.d/p`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |reason: &str| Error::InvalidCidr {
            cidr: s.to_string(),
            reason: reason.to_string(),
        };

        let (addr, prefix) = s.split_once('/').ok_or_else(|| invalid("missing prefix length"))?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid("invalid IPv4 address"))?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid("invalid prefix length"))?;

        Self::new(addr, prefix).map_err(|_| invalid("prefix length exceeds 32"))
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Last address of the range
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix))
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & mask(self.prefix) == u32::from(self.network)
    }

    /// Whether every address of `other` lies inside this network
    pub fn covers(&self, other: &Ipv4Cidr) -> bool {
        self.prefix <= other.prefix && self.contains(other.network)
    }

    /// Whether the two networks share any address
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.covers(other) || other.covers(self)
    }

    /// First subnet of the given prefix length inside this network
    pub fn subnet(&self, prefix: u8) -> Result<Self> {
        if prefix < self.prefix || prefix > 32 {
            return Err(Error::InvalidCidr {
                cidr: self.to_string(),
                reason: format!("cannot carve a /{} subnet", prefix),
            });
        }
        Self::new(self.network, prefix)
    }

    /// Number of addresses usable by hosts (network and broadcast excluded)
    pub fn usable_count(&self) -> u64 {
        if self.prefix >= 31 {
            return 0;
        }
        (1u64 << (32 - self.prefix)) - 2
    }

    /// Whether `addr` is a host address of this network
    pub fn is_usable(&self, addr: Ipv4Addr) -> bool {
        self.usable_count() > 0
            && self.contains(addr)
            && addr != self.network
            && addr != self.broadcast()
    }

    /// Host addresses in ascending order
    pub fn usable_hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let first = u32::from(self.network) + 1;
        let count = self.usable_count() as u32;
        (0..count).map(move |offset| Ipv4Addr::from(first + offset))
    }
}

impl std::fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Derive the subnet volumes are placed in from a network CIDR.
///
/// Without an explicit prefix the subnet is the normalised network itself.
pub fn subnet_of(network_cidr: &str, prefix: Option<u8>) -> Result<Ipv4Cidr> {
    let network = Ipv4Cidr::parse(network_cidr)?;
    match prefix {
        Some(prefix) => network.subnet(prefix),
        None => Ok(network),
    }
}

/// Parse a single IPv4 address property
pub fn parse_address(s: &str) -> Result<Ipv4Addr> {
    s.trim().parse().map_err(|_| Error::InvalidProperty {
        key: "address".into(),
        value: s.to_string(),
        reason: "invalid IPv4 address".into(),
    })
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}
