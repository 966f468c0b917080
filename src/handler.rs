//! Per-message decision logic: classify the request, consult the lease
//! table, and produce an OFFER, ACK, NAK, or silence (RFC 2131 §4.3).

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::lease::{ClientId, LeaseTable};
use crate::options::MessageType;
use crate::packet::DhcpPacket;
use crate::pool::AddressPool;
use crate::reply::{self, ReplyOptions};

/// The pool and lease table, updated atomically under one write lock.
#[derive(Debug)]
pub struct State {
    pub pool: AddressPool,
    pub leases: LeaseTable,
}

impl State {
    pub fn new(pool: AddressPool) -> Self {
        Self {
            pool,
            leases: LeaseTable::new(),
        }
    }
}

/// The client state a REQUEST was sent from, per RFC 2131 Table 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Selecting,
    InitReboot,
    Renewing,
    Rebinding,
}

/// Classifies a REQUEST by its server identifier (54), requested IP (50),
/// ciaddr, and broadcast bit. Returns None for combinations the table calls
/// invalid; those requests are dropped.
pub fn classify_request(packet: &DhcpPacket) -> Option<ClientState> {
    let has_server_id = packet
        .server_identifier()
        .is_some_and(|ip| !ip.is_unspecified());
    let has_requested_ip = packet.requested_ip().is_some();
    let ciaddr_zero = packet.ciaddr.is_unspecified();

    match (has_server_id, has_requested_ip, ciaddr_zero) {
        (true, true, true) => Some(ClientState::Selecting),
        (false, true, true) => Some(ClientState::InitReboot),
        (false, false, false) => Some(if packet.is_broadcast() {
            ClientState::Rebinding
        } else {
            ClientState::Renewing
        }),
        _ => None,
    }
}

/// A reply ready for destination resolution.
pub struct Reply {
    pub packet: DhcpPacket,
    /// Present when the reply is an OFFER whose IP was freshly pulled from
    /// the pool; the allocation is rolled back if the send fails.
    pub offered: Option<(ClientId, Ipv4Addr)>,
}

impl Reply {
    fn new(packet: DhcpPacket) -> Self {
        Self {
            packet,
            offered: None,
        }
    }
}

/// Handles one decoded BOOTREQUEST under the write lock.
///
/// Returns None when the server stays silent: unknown or missing message
/// type, pool exhaustion, a REQUEST meant for another server, or an
/// INIT-REBOOT from a client we have no record of.
pub fn handle_message(
    state: &mut State,
    packet: &DhcpPacket,
    opts: &ReplyOptions,
    now: Instant,
) -> Option<Reply> {
    let mac = ClientId::from_chaddr(&packet.chaddr, packet.hlen);

    let Some(message_type) = packet.message_type() else {
        warn!(%mac, "dropping packet without message type");
        return None;
    };

    if let Some(params) = packet.parameter_request_list() {
        debug!(%mac, ?params, "parameter request list");
    }

    match message_type {
        MessageType::Discover => handle_discover(state, packet, mac, opts, now),
        MessageType::Request => handle_request(state, packet, mac, opts, now),
        MessageType::Release => {
            handle_release(state, packet, mac);
            None
        }
        MessageType::Decline => {
            handle_decline(state, packet, mac);
            None
        }
        other => {
            debug!(%mac, message = %other, "ignoring message");
            None
        }
    }
}

/// IP preference order for an OFFER: the MAC's existing binding, then the
/// requested IP when it is still free, then the head of the pool.
fn handle_discover(
    state: &mut State,
    packet: &DhcpPacket,
    mac: ClientId,
    opts: &ReplyOptions,
    now: Instant,
) -> Option<Reply> {
    let (yiaddr, fresh) = if let Some(binding) = state.leases.get(mac) {
        // Re-offer the held IP; it is already out of the free list and
        // keyed to this MAC, so this also covers a repeated DISCOVER
        // before the client ever sent its REQUEST.
        (binding.ip, false)
    } else if let Some(requested) = packet.requested_ip().filter(|ip| state.pool.take(*ip)) {
        (requested, true)
    } else {
        match state.pool.allocate() {
            Ok(ip) => (ip, true),
            Err(_) => {
                warn!(%mac, "pool exhausted, dropping DISCOVER");
                return None;
            }
        }
    };

    state.leases.upsert(mac, yiaddr, now + lease_duration(opts));
    info!(%mac, ip = %yiaddr, "OFFER");

    let mut reply = Reply::new(reply::offer(packet, yiaddr, opts));
    if fresh {
        reply.offered = Some((mac, yiaddr));
    }
    Some(reply)
}

fn handle_request(
    state: &mut State,
    packet: &DhcpPacket,
    mac: ClientId,
    opts: &ReplyOptions,
    now: Instant,
) -> Option<Reply> {
    let Some(client_state) = classify_request(packet) else {
        warn!(%mac, "dropping REQUEST with invalid field combination");
        return None;
    };

    match client_state {
        ClientState::Selecting => {
            if packet.server_identifier() != Some(opts.server_ip) {
                debug!(%mac, "client selected another server");
                return None;
            }
            let requested = packet.requested_ip()?;
            match state.leases.get(mac).copied() {
                Some(binding) if binding.ip == requested => {
                    Some(acknowledge(state, packet, mac, requested, opts, now))
                }
                _ => Some(negative(packet, mac, opts, "no offer matching REQUEST")),
            }
        }
        ClientState::InitReboot => {
            let requested = packet.requested_ip()?;
            if !opts.subnet_contains(requested) {
                return Some(negative(packet, mac, opts, "requested IP is off-subnet"));
            }
            match state.leases.get(mac).copied() {
                None => {
                    // Another server may hold the binding; stay silent.
                    debug!(%mac, ip = %requested, "no record for INIT-REBOOT");
                    None
                }
                Some(binding) if binding.ip == requested && !binding.is_expired(now) => {
                    Some(acknowledge(state, packet, mac, requested, opts, now))
                }
                Some(_) => Some(negative(packet, mac, opts, "stale INIT-REBOOT binding")),
            }
        }
        ClientState::Renewing | ClientState::Rebinding => {
            match state.leases.get(mac).copied() {
                Some(binding) if binding.ip == packet.ciaddr && !binding.is_expired(now) => {
                    Some(acknowledge(state, packet, mac, packet.ciaddr, opts, now))
                }
                _ => Some(negative(packet, mac, opts, "cannot extend lease")),
            }
        }
    }
}

fn handle_release(state: &mut State, packet: &DhcpPacket, mac: ClientId) {
    match state.leases.get(mac).copied() {
        Some(binding) if binding.ip == packet.ciaddr => {
            state.leases.remove_by_mac(mac);
            state.pool.release(packet.ciaddr);
            info!(%mac, ip = %packet.ciaddr, "RELEASE");
        }
        _ => warn!(%mac, ciaddr = %packet.ciaddr, "RELEASE does not match any binding"),
    }
}

/// A declined IP is held out of both the table and the free list until the
/// next reaper sweep, in case it is genuinely in conflict on the wire.
fn handle_decline(state: &mut State, packet: &DhcpPacket, mac: ClientId) {
    let Some(declined) = packet.requested_ip() else {
        warn!(%mac, "DECLINE without requested IP");
        return;
    };

    match state.leases.get(mac).copied() {
        Some(binding) if binding.ip == declined => {
            state.leases.remove_by_mac(mac);
            state.leases.quarantine(declined);
            warn!(%mac, ip = %declined, "DECLINE, quarantining address");
        }
        _ => {
            if state.pool.take(declined) {
                state.leases.quarantine(declined);
                warn!(%mac, ip = %declined, "DECLINE for unbound address, quarantining");
            } else {
                warn!(%mac, ip = %declined, "ignoring DECLINE for address not held by client");
            }
        }
    }
}

fn acknowledge(
    state: &mut State,
    packet: &DhcpPacket,
    mac: ClientId,
    ip: Ipv4Addr,
    opts: &ReplyOptions,
    now: Instant,
) -> Reply {
    state.leases.upsert(mac, ip, now + lease_duration(opts));
    info!(%mac, %ip, "ACK");
    Reply::new(reply::ack(packet, ip, opts))
}

fn negative(packet: &DhcpPacket, mac: ClientId, opts: &ReplyOptions, reason: &str) -> Reply {
    warn!(%mac, reason, "NAK");
    Reply::new(reply::nak(packet, opts))
}

fn lease_duration(opts: &ReplyOptions) -> Duration {
    Duration::from_secs(u64::from(opts.lease_secs))
}
