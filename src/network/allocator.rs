//! Address Allocator
//!
//! Hands out frontend and replica addresses from a subnet's usable host
//! range. Reservations are kept per address scope: a scope is the widest
//! subnet allocated from so far within its range, so overlapping subnets
//! share one ledger and one mutex. Allocations within a scope are
//! serialised, allocations in disjoint scopes proceed independently.

use super::cidr::{parse_address, Ipv4Cidr};
use crate::domain::claim::{split_list, PropertyKey, VolumeClaim};
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Network Allocation
// =============================================================================

/// Addresses assigned to one volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAllocation {
    /// Frontend (controller) address
    pub frontend_ip: Ipv4Addr,
    /// Replica addresses, ordered by replica index
    pub backend_ips: Vec<Ipv4Addr>,
    /// Subnet all addresses belong to
    pub subnet: Ipv4Cidr,
}

impl NetworkAllocation {
    /// Frontend first, then replicas in order
    pub fn addresses(&self) -> Vec<Ipv4Addr> {
        std::iter::once(self.frontend_ip)
            .chain(self.backend_ips.iter().copied())
            .collect()
    }

    /// Comma-separated replica addresses, as stored on claims
    pub fn backend_ips_string(&self) -> String {
        join_addresses(&self.backend_ips)
    }
}

/// Join addresses into a comma-separated property value
pub fn join_addresses(addrs: &[Ipv4Addr]) -> String {
    addrs
        .iter()
        .map(Ipv4Addr::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// Scope Ledger
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Role {
    Frontend,
    Replica(usize),
}

#[derive(Debug, Clone)]
struct Reservation {
    owner: String,
    role: Role,
}

/// Reservations within one address scope: address -> holder
#[derive(Debug)]
struct ScopeLedger {
    reserved: BTreeMap<Ipv4Addr, Reservation>,
}

impl ScopeLedger {
    fn new() -> Self {
        Self {
            reserved: BTreeMap::new(),
        }
    }

    fn within(&self, subnet: Ipv4Cidr) -> impl Iterator<Item = (&Ipv4Addr, &Reservation)> {
        self.reserved.range(subnet.network()..=subnet.broadcast())
    }

    fn available(&self, subnet: Ipv4Cidr) -> usize {
        let taken = self
            .within(subnet)
            .filter(|(addr, _)| subnet.is_usable(**addr))
            .count();
        (subnet.usable_count() as usize).saturating_sub(taken)
    }

    /// Check pre-assigned addresses without reserving them
    fn check_existing(&self, subnet: Ipv4Cidr, owner: &str, addrs: &[Ipv4Addr]) -> Result<()> {
        let mut seen = BTreeSet::new();
        for addr in addrs {
            if !subnet.is_usable(*addr) {
                return Err(Error::AddressOutsideSubnet {
                    address: addr.to_string(),
                    subnet: subnet.to_string(),
                });
            }
            if !seen.insert(*addr) {
                return Err(Error::AddressInUse {
                    address: addr.to_string(),
                    owner: owner.to_string(),
                });
            }
            if let Some(holder) = self.reserved.get(addr) {
                if holder.owner != owner {
                    return Err(Error::AddressInUse {
                        address: addr.to_string(),
                        owner: holder.owner.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Count of addresses in `addrs` not yet held by anyone
    fn unreserved_among(&self, addrs: &[Ipv4Addr]) -> usize {
        addrs.iter().filter(|a| !self.reserved.contains_key(a)).count()
    }

    /// Frontend and replicas (by index) `owner` already holds in `subnet`
    fn held_by(&self, subnet: Ipv4Cidr, owner: &str) -> (Option<Ipv4Addr>, Vec<Ipv4Addr>) {
        let mut frontend = None;
        let mut replicas = Vec::new();
        for (addr, held) in self.within(subnet).filter(|(_, r)| r.owner == owner) {
            match held.role {
                Role::Frontend => {
                    frontend.get_or_insert(*addr);
                }
                Role::Replica(index) => replicas.push((index, *addr)),
            }
        }
        replicas.sort();
        (frontend, replicas.into_iter().map(|(_, addr)| addr).collect())
    }

    fn reserve(&mut self, owner: &str, addr: Ipv4Addr, role: Role) {
        self.reserved.insert(
            addr,
            Reservation {
                owner: owner.to_string(),
                role,
            },
        );
    }

    /// The lowest `count` free host addresses of `subnet`. Caller checks availability.
    fn free(&self, subnet: Ipv4Cidr, count: usize) -> Vec<Ipv4Addr> {
        subnet
            .usable_hosts()
            .filter(|addr| !self.reserved.contains_key(addr))
            .take(count)
            .collect()
    }

    fn release(&mut self, owner: &str) -> usize {
        let before = self.reserved.len();
        self.reserved.retain(|_, held| held.owner != owner);
        before - self.reserved.len()
    }

    fn release_addresses(&mut self, owner: &str, addrs: &[Ipv4Addr]) -> usize {
        let mut released = 0;
        for addr in addrs {
            if self.reserved.get(addr).is_some_and(|h| h.owner == owner) {
                self.reserved.remove(addr);
                released += 1;
            }
        }
        released
    }

    fn addresses_of<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = Ipv4Addr> + 'a {
        self.reserved
            .iter()
            .filter(move |(_, held)| held.owner == owner)
            .map(|(addr, _)| *addr)
    }
}

type ScopeTable = BTreeMap<Ipv4Cidr, Arc<Mutex<ScopeLedger>>>;

/// Scope whose range contains `subnet`. Scopes are disjoint, so only the
/// greatest scope ordered at or before `subnet` can cover it.
fn covering(scopes: &ScopeTable, subnet: Ipv4Cidr) -> Option<Arc<Mutex<ScopeLedger>>> {
    scopes
        .range(..=subnet)
        .next_back()
        .filter(|(scope, _)| scope.covers(&subnet))
        .map(|(_, ledger)| ledger.clone())
}

// =============================================================================
// Address Allocator
// =============================================================================

/// Allocates non-conflicting addresses across any number of subnets
#[derive(Debug, Default)]
pub struct AddressAllocator {
    scopes: RwLock<ScopeTable>,
}

impl AddressAllocator {
    /// Create a new allocator
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run `f` against the ledger of the scope covering `subnet`.
    ///
    /// The scope table stays read-locked while `f` runs, so a scope is never
    /// merged away underneath an allocation.
    fn with_ledger<T>(&self, subnet: Ipv4Cidr, f: impl FnOnce(&mut ScopeLedger) -> T) -> T {
        loop {
            {
                let scopes = self.scopes.read();
                if let Some(ledger) = covering(&scopes, subnet) {
                    let mut ledger = ledger.lock();
                    return f(&mut *ledger);
                }
            }
            self.open_scope(subnet);
        }
    }

    /// Add `subnet` as a scope, absorbing the scopes it covers
    fn open_scope(&self, subnet: Ipv4Cidr) {
        let mut scopes = self.scopes.write();
        if covering(&scopes, subnet).is_some() {
            return;
        }

        let covered: Vec<Ipv4Cidr> = scopes
            .range(subnet..)
            .take_while(|(scope, _)| subnet.covers(scope))
            .map(|(scope, _)| *scope)
            .collect();

        let mut ledger = ScopeLedger::new();
        for scope in &covered {
            if let Some(old) = scopes.remove(scope) {
                let reserved = std::mem::take(&mut old.lock().reserved);
                ledger.reserved.extend(reserved);
            }
        }
        if !covered.is_empty() {
            debug!("Address scope {} absorbed {} narrower scopes", subnet, covered.len());
        }
        scopes.insert(subnet, Arc::new(Mutex::new(ledger)));
    }

    fn ledgers(&self) -> Vec<Arc<Mutex<ScopeLedger>>> {
        self.scopes.read().values().cloned().collect()
    }

    /// Reserve the `count` lowest free addresses of a subnet for `owner`.
    ///
    /// The first address plays the frontend role, the rest are replicas.
    /// Nothing is reserved when fewer than `count` addresses are free.
    pub fn available_addresses(
        &self,
        subnet: Ipv4Cidr,
        owner: &str,
        count: usize,
    ) -> Result<Vec<Ipv4Addr>> {
        self.with_ledger(subnet, |ledger| {
            let available = ledger.available(subnet);
            if available < count {
                return Err(Error::AddressPoolExhausted {
                    subnet: subnet.to_string(),
                    requested: count,
                    available,
                });
            }

            let picked = ledger.free(subnet, count);
            for (i, addr) in picked.iter().enumerate() {
                let role = match i {
                    0 => Role::Frontend,
                    n => Role::Replica(n - 1),
                };
                ledger.reserve(owner, *addr, role);
            }
            Ok(picked)
        })
    }

    /// Allocate whatever a volume is still missing.
    ///
    /// Addresses the volume already carries, or already holds in the subnet
    /// from an earlier allocation, are validated and kept; only the absent
    /// role (frontend, replicas, or both) receives fresh addresses.
    pub fn allocate(
        &self,
        owner: &str,
        subnet: Ipv4Cidr,
        replica_count: usize,
        frontend: Option<Ipv4Addr>,
        backends: Vec<Ipv4Addr>,
    ) -> Result<NetworkAllocation> {
        if !backends.is_empty() && backends.len() != replica_count {
            return Err(Error::ReplicaIpCountMismatch {
                ips: backends.len(),
                replicas: replica_count,
            });
        }

        self.with_ledger(subnet, |ledger| {
            let (held_frontend, held_backends) = ledger.held_by(subnet, owner);
            let frontend = frontend.or(held_frontend);
            let backends = match backends.is_empty() {
                false => backends,
                true if held_backends.is_empty() || held_backends.len() == replica_count => {
                    held_backends
                }
                true => {
                    return Err(Error::ReplicaIpCountMismatch {
                        ips: held_backends.len(),
                        replicas: replica_count,
                    })
                }
            };

            let existing: Vec<Ipv4Addr> =
                frontend.iter().copied().chain(backends.iter().copied()).collect();
            ledger.check_existing(subnet, owner, &existing)?;

            let needed = match (frontend.is_some(), !backends.is_empty()) {
                (false, false) => 1 + replica_count,
                (false, true) => 1,
                (true, false) => replica_count,
                (true, true) => 0,
            };

            let available = ledger
                .available(subnet)
                .saturating_sub(ledger.unreserved_among(&existing));
            if available < needed {
                return Err(Error::AddressPoolExhausted {
                    subnet: subnet.to_string(),
                    requested: needed,
                    available,
                });
            }

            let mut fresh = ledger.free(subnet, needed + existing.len()).into_iter();
            let mut next_fresh = || {
                fresh
                    .find(|addr| !existing.contains(addr))
                    .ok_or_else(|| Error::Internal("allocator returned too few addresses".into()))
            };

            let frontend_ip = match frontend {
                Some(ip) => ip,
                None => next_fresh()?,
            };
            let backend_ips = if backends.is_empty() {
                (0..replica_count)
                    .map(|_| next_fresh())
                    .collect::<Result<Vec<_>>>()?
            } else {
                backends
            };

            ledger.reserve(owner, frontend_ip, Role::Frontend);
            for (index, ip) in backend_ips.iter().enumerate() {
                ledger.reserve(owner, *ip, Role::Replica(index));
            }

            debug!(
                "Allocated {} for volume {}: frontend {}, {} replicas ({} fresh)",
                subnet,
                owner,
                frontend_ip,
                backend_ips.len(),
                needed
            );

            Ok(NetworkAllocation {
                frontend_ip,
                backend_ips,
                subnet,
            })
        })
    }

    /// Allocate the missing addresses of a claim and record them on it.
    ///
    /// Properties already on the claim are never rewritten.
    pub fn allocate_for_claim(
        &self,
        claim: &mut VolumeClaim,
        subnet: Ipv4Cidr,
        replica_count: usize,
    ) -> Result<NetworkAllocation> {
        let frontend = match claim.get(PropertyKey::ControllerIps) {
            Some(value) => Some(single_address(PropertyKey::ControllerIps, value)?),
            None => None,
        };
        let backends = claim
            .replica_ips()?
            .iter()
            .map(|ip| parse_address(ip))
            .collect::<Result<Vec<_>>>()?;

        let allocation = self.allocate(&claim.name, subnet, replica_count, frontend, backends)?;

        claim.set_if_absent(PropertyKey::ControllerIps, allocation.frontend_ip.to_string());
        claim.set_if_absent(PropertyKey::ReplicaIps, allocation.backend_ips_string());

        Ok(allocation)
    }

    /// Free every address held by a volume, in every subnet
    pub fn release(&self, owner: &str) -> usize {
        let released: usize = self
            .ledgers()
            .iter()
            .map(|l| l.lock().release(owner))
            .sum();

        if released > 0 {
            info!("Released {} addresses held by volume {}", released, owner);
        }
        released
    }

    /// Free specific addresses, only where `owner` still holds them
    pub fn release_addresses(&self, owner: &str, addrs: &[Ipv4Addr]) -> usize {
        self.ledgers()
            .iter()
            .map(|l| l.lock().release_addresses(owner, addrs))
            .sum()
    }

    /// Number of addresses currently reserved inside a subnet
    pub fn reserved_in(&self, subnet: Ipv4Cidr) -> usize {
        self.ledgers()
            .iter()
            .map(|l| l.lock().within(subnet).count())
            .sum()
    }

    /// Addresses a volume holds across all subnets, ascending
    pub fn addresses_of(&self, owner: &str) -> Vec<Ipv4Addr> {
        let mut held: Vec<Ipv4Addr> = self
            .ledgers()
            .iter()
            .flat_map(|l| l.lock().addresses_of(owner).collect::<Vec<_>>())
            .collect();
        held.sort();
        held
    }

    /// Number of addresses reserved across all subnets
    pub fn total_reserved(&self) -> usize {
        self.ledgers().iter().map(|l| l.lock().reserved.len()).sum()
    }
}

fn single_address(key: PropertyKey, value: &str) -> Result<Ipv4Addr> {
    let parts = split_list(key, value)?;
    match parts.as_slice() {
        [only] => parse_address(only),
        _ => Err(Error::InvalidProperty {
            key: key.label().to_string(),
            value: value.to_string(),
            reason: "exactly one frontend address is supported".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashSet;

    fn subnet(s: &str) -> Ipv4Cidr {
        Ipv4Cidr::parse(s).unwrap()
    }

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_fresh_allocation_is_ascending_and_distinct() {
        let allocator = AddressAllocator::new();
        let alloc = allocator
            .allocate("vol1", subnet("10.0.0.0/24"), 3, None, vec![])
            .unwrap();

        assert_eq!(alloc.frontend_ip, ip("10.0.0.1"));
        assert_eq!(alloc.backend_ips, vec![ip("10.0.0.2"), ip("10.0.0.3"), ip("10.0.0.4")]);
        let distinct: HashSet<_> = alloc.addresses().into_iter().collect();
        assert_eq!(distinct.len(), 4);
        assert!(alloc.addresses().iter().all(|a| alloc.subnet.contains(*a)));
    }

    #[test]
    fn test_available_addresses_all_or_nothing() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.1.0/29");

        let first = allocator.available_addresses(net, "vol1", 4).unwrap();
        assert_eq!(first, vec![ip("10.0.1.1"), ip("10.0.1.2"), ip("10.0.1.3"), ip("10.0.1.4")]);

        let err = allocator.available_addresses(net, "vol2", 3).unwrap_err();
        assert_matches!(err, Error::AddressPoolExhausted { requested: 3, available: 2, .. });
        assert_eq!(allocator.reserved_in(net), 4);
        assert!(allocator.addresses_of("vol2").is_empty());
    }

    #[test]
    fn test_second_volume_gets_disjoint_addresses() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.0.0/24");
        let a = allocator.allocate("vol1", net, 2, None, vec![]).unwrap();
        let b = allocator.allocate("vol2", net, 2, None, vec![]).unwrap();

        let a: HashSet<_> = a.addresses().into_iter().collect();
        let b: HashSet<_> = b.addresses().into_iter().collect();
        assert!(a.is_disjoint(&b));
        assert_eq!(allocator.reserved_in(net), 6);
    }

    #[test]
    fn test_only_backends_allocated_when_frontend_present() {
        let allocator = AddressAllocator::new();
        let alloc = allocator
            .allocate("vol1", subnet("10.0.0.0/24"), 2, Some(ip("10.0.0.10")), vec![])
            .unwrap();

        assert_eq!(alloc.frontend_ip, ip("10.0.0.10"));
        assert_eq!(alloc.backend_ips, vec![ip("10.0.0.1"), ip("10.0.0.2")]);
    }

    #[test]
    fn test_only_frontend_allocated_when_backends_present() {
        let allocator = AddressAllocator::new();
        let alloc = allocator
            .allocate(
                "vol1",
                subnet("10.0.0.0/24"),
                2,
                None,
                vec![ip("10.0.0.1"), ip("10.0.0.2")],
            )
            .unwrap();

        assert_eq!(alloc.frontend_ip, ip("10.0.0.3"));
        assert_eq!(alloc.backend_ips, vec![ip("10.0.0.1"), ip("10.0.0.2")]);
    }

    #[test]
    fn test_exhaustion_reserves_nothing() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.0.0/30"); // two usable hosts
        let err = allocator.allocate("vol1", net, 2, None, vec![]).unwrap_err();

        assert_matches!(
            err,
            Error::AddressPoolExhausted { requested: 3, available: 2, .. }
        );
        assert_eq!(allocator.reserved_in(net), 0);
    }

    #[test]
    fn test_stale_backend_list_is_a_mismatch() {
        let allocator = AddressAllocator::new();
        let err = allocator
            .allocate("vol1", subnet("10.0.0.0/24"), 3, None, vec![ip("10.0.0.5")])
            .unwrap_err();
        assert_matches!(err, Error::ReplicaIpCountMismatch { ips: 1, replicas: 3 });
    }

    #[test]
    fn test_preassigned_address_must_be_in_subnet() {
        let allocator = AddressAllocator::new();
        let err = allocator
            .allocate("vol1", subnet("10.0.0.0/24"), 1, Some(ip("10.0.1.1")), vec![])
            .unwrap_err();
        assert_matches!(err, Error::AddressOutsideSubnet { .. });
    }

    #[test]
    fn test_preassigned_address_held_by_other_volume() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.0.0/24");
        allocator.allocate("vol1", net, 1, None, vec![]).unwrap();

        let err = allocator
            .allocate("vol2", net, 1, Some(ip("10.0.0.1")), vec![])
            .unwrap_err();
        assert_matches!(err, Error::AddressInUse { owner, .. } if owner == "vol1");
    }

    #[test]
    fn test_retry_keeps_own_addresses() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.0.0/24");
        let mut claim = VolumeClaim::new("vol1");

        let first = allocator.allocate_for_claim(&mut claim, net, 2).unwrap();
        let second = allocator.allocate_for_claim(&mut claim, net, 2).unwrap();

        assert_eq!(first, second);
        assert_eq!(allocator.reserved_in(net), 3);
        assert_eq!(claim.get(PropertyKey::ControllerIps), Some("10.0.0.1"));
        assert_eq!(claim.get(PropertyKey::ReplicaIps), Some("10.0.0.2,10.0.0.3"));
    }

    #[test]
    fn test_claim_with_frontend_gets_exactly_replica_count_new_addresses() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.0.0/24");
        let mut claim = VolumeClaim::new("vol1").with(PropertyKey::ControllerIps, "10.0.0.50");

        let alloc = allocator.allocate_for_claim(&mut claim, net, 3).unwrap();

        assert_eq!(claim.get(PropertyKey::ControllerIps), Some("10.0.0.50"));
        assert_eq!(alloc.backend_ips.len(), 3);
        assert!(!alloc.backend_ips.contains(&ip("10.0.0.50")));
        assert_eq!(allocator.reserved_in(net), 4);
    }

    #[test]
    fn test_multiple_frontend_addresses_rejected() {
        let allocator = AddressAllocator::new();
        let mut claim =
            VolumeClaim::new("vol1").with(PropertyKey::ControllerIps, "10.0.0.5,10.0.0.6");
        let err = allocator
            .allocate_for_claim(&mut claim, subnet("10.0.0.0/24"), 1)
            .unwrap_err();
        assert_matches!(err, Error::InvalidProperty { .. });
    }

    #[test]
    fn test_release_frees_addresses_for_reuse() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.0.0/29");
        allocator.allocate("vol1", net, 2, None, vec![]).unwrap();
        assert_eq!(allocator.addresses_of("vol1").len(), 3);
        assert_eq!(allocator.release("vol1"), 3);
        assert!(allocator.addresses_of("vol1").is_empty());
        assert_eq!(allocator.total_reserved(), 0);

        let again = allocator.allocate("vol2", net, 2, None, vec![]).unwrap();
        assert_eq!(again.frontend_ip, ip("10.0.0.1"));
    }

    #[test]
    fn test_release_addresses_only_frees_own() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.0.0/24");
        allocator.allocate("vol1", net, 1, None, vec![]).unwrap();
        allocator.allocate("vol2", net, 1, None, vec![]).unwrap();

        let freed = allocator.release_addresses("vol1", &[ip("10.0.0.1"), ip("10.0.0.3")]);
        assert_eq!(freed, 1);
        assert_eq!(allocator.addresses_of("vol1"), vec![ip("10.0.0.2")]);
        assert_eq!(allocator.addresses_of("vol2"), vec![ip("10.0.0.3"), ip("10.0.0.4")]);
    }

    #[test]
    fn test_concurrent_allocations_never_overlap() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.0.0/22");

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let allocator = allocator.clone();
                std::thread::spawn(move || {
                    allocator
                        .allocate(&format!("vol{}", i), net, 3, None, vec![])
                        .unwrap()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for addr in handle.join().unwrap().addresses() {
                assert!(seen.insert(addr), "address {} handed out twice", addr);
            }
        }
        assert_eq!(seen.len(), 64);
    }

    #[test]
    fn test_overlapping_subnets_share_reservations() {
        let allocator = AddressAllocator::new();
        let wide = subnet("10.0.0.0/24");
        let narrow = subnet("10.0.0.0/25");

        let a = allocator.allocate("vol1", wide, 2, None, vec![]).unwrap();
        let b = allocator.allocate("vol2", narrow, 2, None, vec![]).unwrap();

        assert_eq!(a.frontend_ip, ip("10.0.0.1"));
        assert_eq!(b.frontend_ip, ip("10.0.0.4"));
        assert_eq!(b.backend_ips, vec![ip("10.0.0.5"), ip("10.0.0.6")]);
        assert_eq!(allocator.reserved_in(wide), 6);
        assert_eq!(allocator.reserved_in(narrow), 6);
    }

    #[test]
    fn test_wider_subnet_absorbs_narrower_reservations() {
        let allocator = AddressAllocator::new();
        allocator
            .allocate("vol1", subnet("10.0.0.0/25"), 1, None, vec![])
            .unwrap();
        allocator
            .allocate("vol2", subnet("10.0.0.128/25"), 1, None, vec![])
            .unwrap();

        let wide = allocator
            .allocate("vol3", subnet("10.0.0.0/24"), 1, None, vec![])
            .unwrap();
        assert_eq!(wide.addresses(), vec![ip("10.0.0.3"), ip("10.0.0.4")]);

        let err = allocator
            .allocate("vol4", subnet("10.0.0.0/25"), 1, Some(ip("10.0.0.3")), vec![])
            .unwrap_err();
        assert_matches!(err, Error::AddressInUse { owner, .. } if owner == "vol3");

        let err = allocator
            .allocate("vol4", subnet("10.0.0.128/25"), 1, Some(ip("10.0.0.129")), vec![])
            .unwrap_err();
        assert_matches!(err, Error::AddressInUse { owner, .. } if owner == "vol2");

        assert_eq!(allocator.release("vol1"), 2);
        assert_eq!(allocator.total_reserved(), 4);
    }

    #[test]
    fn test_reallocating_held_volume_reuses_addresses() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.0.0/24");

        let first = allocator.allocate("vol1", net, 2, None, vec![]).unwrap();
        allocator.allocate("vol2", net, 2, None, vec![]).unwrap();
        let again = allocator.allocate("vol1", net, 2, None, vec![]).unwrap();

        assert_eq!(first, again);
        assert_eq!(allocator.addresses_of("vol1").len(), 3);
        assert_eq!(allocator.total_reserved(), 6);
    }

    #[test]
    fn test_reallocation_keeps_roles() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.0.0/24");

        let first = allocator
            .allocate("vol1", net, 2, Some(ip("10.0.0.50")), vec![])
            .unwrap();
        let again = allocator.allocate("vol1", net, 2, None, vec![]).unwrap();

        assert_eq!(again.frontend_ip, ip("10.0.0.50"));
        assert_eq!(again.backend_ips, first.backend_ips);
        assert_eq!(allocator.addresses_of("vol1").len(), 3);
    }

    #[test]
    fn test_held_replicas_disagreeing_with_count() {
        let allocator = AddressAllocator::new();
        let net = subnet("10.0.0.0/24");
        allocator.allocate("vol1", net, 2, None, vec![]).unwrap();

        let err = allocator.allocate("vol1", net, 3, None, vec![]).unwrap_err();
        assert_matches!(err, Error::ReplicaIpCountMismatch { ips: 2, replicas: 3 });
        assert_eq!(allocator.addresses_of("vol1").len(), 3);
    }

    #[test]
    fn test_concurrent_allocations_across_overlapping_subnets() {
        let allocator = AddressAllocator::new();
        let subnets = [
            subnet("10.0.0.0/22"),
            subnet("10.0.0.0/24"),
            subnet("10.0.0.0/23"),
            subnet("10.0.0.0/25"),
        ];

        let handles: Vec<_> = (0..24)
            .map(|i| {
                let allocator = allocator.clone();
                let net = subnets[i % subnets.len()];
                std::thread::spawn(move || {
                    allocator
                        .allocate(&format!("vol{}", i), net, 3, None, vec![])
                        .unwrap()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for addr in handle.join().unwrap().addresses() {
                assert!(seen.insert(addr), "address {} handed out twice", addr);
            }
        }
        assert_eq!(seen.len(), 96);
        assert_eq!(allocator.total_reserved(), 96);
    }
}
