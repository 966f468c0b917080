//! Lease bindings between client hardware addresses and pool IPs.
//!
//! The table enforces at most one active binding per MAC and per IP. A
//! secondary IP index backs O(1) in-use checks and release-by-ip. All
//! mutation happens under the server's write lock; expirations are
//! monotonic [`Instant`]s because nothing here survives a restart.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::time::Instant;

/// A client hardware address folded into a 48-bit key.
///
/// Taken from `chaddr[0..hlen]`, truncated to the 6 bytes of an IEEE-802
/// MAC so it can key a hash map directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new(mac: [u8; 6]) -> Self {
        let mut key = 0u64;
        for byte in mac {
            key = key << 8 | u64::from(byte);
        }
        Self(key)
    }

    /// Key for a packet's hardware address field.
    pub fn from_chaddr(chaddr: &[u8; 16], hlen: u8) -> Self {
        let len = usize::from(hlen.min(16)).min(6);
        let mut mac = [0u8; 6];
        mac[..len].copy_from_slice(&chaddr[..len]);
        Self::new(mac)
    }

    pub fn octets(&self) -> [u8; 6] {
        let mut mac = [0u8; 6];
        for (index, byte) in mac.iter_mut().enumerate() {
            *byte = (self.0 >> (8 * (5 - index))) as u8;
        }
        mac
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mac = self.octets();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        )
    }
}

/// A server-side record associating a client MAC with an IP and an
/// expiration time.
#[derive(Debug, Clone, Copy)]
pub struct Binding {
    pub ip: Ipv4Addr,
    pub mac: ClientId,
    pub expires_at: Instant,
}

impl Binding {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at < now
    }
}

/// The binding store: MAC → binding, with a secondary set of the IPs
/// currently bound.
///
/// Invariant: after every operation the secondary set equals
/// `{b.ip | b ∈ table}`. Declined IPs sit in a quarantine list, outside
/// both the table and the pool, until the reaper drains them.
#[derive(Debug, Default)]
pub struct LeaseTable {
    bindings: HashMap<ClientId, Binding>,
    allocated: HashSet<Ipv4Addr>,
    quarantined: Vec<Ipv4Addr>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces the binding for `mac`.
    ///
    /// When a prior binding held a different IP the caller is responsible
    /// for returning that IP to the pool; the table only keeps its indexes
    /// consistent.
    pub fn upsert(&mut self, mac: ClientId, ip: Ipv4Addr, expires_at: Instant) {
        if let Some(previous) = self.bindings.insert(mac, Binding { ip, mac, expires_at }) {
            self.allocated.remove(&previous.ip);
        }
        self.allocated.insert(ip);
    }

    pub fn get(&self, mac: ClientId) -> Option<&Binding> {
        self.bindings.get(&mac)
    }

    pub fn contains_ip(&self, ip: Ipv4Addr) -> bool {
        self.allocated.contains(&ip)
    }

    pub fn remove_by_mac(&mut self, mac: ClientId) -> Option<Binding> {
        let binding = self.bindings.remove(&mac)?;
        self.allocated.remove(&binding.ip);
        Some(binding)
    }

    pub fn remove_by_ip(&mut self, ip: Ipv4Addr) -> Option<Binding> {
        let mac = self
            .bindings
            .values()
            .find(|binding| binding.ip == ip)
            .map(|binding| binding.mac)?;
        self.remove_by_mac(mac)
    }

    /// Removes every binding with `expiration < now` and returns their IPs
    /// for pool re-insertion.
    pub fn sweep(&mut self, now: Instant) -> Vec<Ipv4Addr> {
        let expired: Vec<ClientId> = self
            .bindings
            .values()
            .filter(|binding| binding.is_expired(now))
            .map(|binding| binding.mac)
            .collect();

        expired
            .into_iter()
            .filter_map(|mac| self.remove_by_mac(mac))
            .map(|binding| binding.ip)
            .collect()
    }

    /// Holds a declined IP out of circulation until the next sweep.
    pub fn quarantine(&mut self, ip: Ipv4Addr) {
        if !self.quarantined.contains(&ip) {
            self.quarantined.push(ip);
        }
    }

    pub fn drain_quarantine(&mut self) -> Vec<Ipv4Addr> {
        std::mem::take(&mut self.quarantined)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
