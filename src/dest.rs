//! Reply destination selection per RFC 2131 §4.1.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::handler::{ClientState, classify_request};
use crate::options::MessageType;
use crate::packet::DhcpPacket;

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;

/// Picks the UDP destination for `reply` and, for a relayed NAK, sets the
/// broadcast flag so the relay re-broadcasts on the client subnet.
///
/// Rule order: NAK handling, then relay (giaddr), then a bound client
/// (ciaddr), then broadcast for clients that cannot yet receive unicast
/// (broadcast flag, DISCOVER, INIT-REBOOT), and finally link-layer unicast
/// to the address being handed out.
pub fn resolve(request: &DhcpPacket, reply: &mut DhcpPacket) -> SocketAddrV4 {
    let via_relay = request.giaddr != Ipv4Addr::UNSPECIFIED;

    if reply.message_type() == Some(MessageType::Nak) {
        return if via_relay {
            reply.set_broadcast();
            SocketAddrV4::new(request.giaddr, DHCP_SERVER_PORT)
        } else {
            SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT)
        };
    }

    if via_relay {
        return SocketAddrV4::new(request.giaddr, DHCP_SERVER_PORT);
    }

    if request.ciaddr != Ipv4Addr::UNSPECIFIED {
        return SocketAddrV4::new(request.ciaddr, DHCP_CLIENT_PORT);
    }

    let pre_address = request.message_type() == Some(MessageType::Discover)
        || classify_request(request) == Some(ClientState::InitReboot);
    if request.is_broadcast() || pre_address {
        return SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT);
    }

    // The client has accepted yiaddr but not configured it yet; the sink is
    // expected to deliver this as a pre-ARP link-layer unicast.
    SocketAddrV4::new(reply.yiaddr, DHCP_CLIENT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DhcpOption;
    use crate::packet::BOOTREQUEST;
    use crate::reply::{self, ReplyOptions};

    fn test_opts() -> ReplyOptions {
        ReplyOptions {
            server_ip: Ipv4Addr::new(192, 168, 1, 2),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            router: Ipv4Addr::new(192, 168, 1, 1),
            dns_servers: vec![Ipv4Addr::new(8, 8, 8, 8)],
            domain_name: None,
            lease_secs: 3600,
            renewal_secs: 1800,
            rebinding_secs: 3150,
        }
    }

    fn request(message_type: MessageType, options: Vec<DhcpOption>) -> DhcpPacket {
        let mut all_options = vec![DhcpOption::MessageType(message_type)];
        all_options.extend(options);
        DhcpPacket {
            op: BOOTREQUEST,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 1,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0u8; 16],
            sname: [0u8; 64],
            file: [0u8; 128],
            options: all_options,
        }
    }

    #[test]
    fn test_nak_broadcasts_without_relay() {
        let req = request(
            MessageType::Request,
            vec![DhcpOption::RequestedIpAddress(Ipv4Addr::new(10, 0, 0, 1))],
        );
        let mut nak = reply::nak(&req, &test_opts());

        let dest = resolve(&req, &mut nak);
        assert_eq!(
            dest,
            SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT)
        );
    }

    #[test]
    fn test_nak_through_relay_sets_broadcast_flag() {
        let mut req = request(
            MessageType::Request,
            vec![DhcpOption::RequestedIpAddress(Ipv4Addr::new(10, 0, 0, 1))],
        );
        req.giaddr = Ipv4Addr::new(192, 168, 5, 1);
        let mut nak = reply::nak(&req, &test_opts());
        assert!(!nak.is_broadcast());

        let dest = resolve(&req, &mut nak);
        assert_eq!(
            dest,
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 5, 1), DHCP_SERVER_PORT)
        );
        assert!(nak.is_broadcast());
    }

    #[test]
    fn test_relayed_reply_goes_to_giaddr() {
        let mut req = request(MessageType::Discover, vec![]);
        req.giaddr = Ipv4Addr::new(192, 168, 5, 1);
        let mut offer = reply::offer(&req, Ipv4Addr::new(192, 168, 1, 100), &test_opts());

        let dest = resolve(&req, &mut offer);
        assert_eq!(
            dest,
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 5, 1), DHCP_SERVER_PORT)
        );
    }

    #[test]
    fn test_renewing_reply_unicasts_to_ciaddr() {
        let mut req = request(MessageType::Request, vec![]);
        req.ciaddr = Ipv4Addr::new(192, 168, 1, 100);
        let mut ack = reply::ack(&req, req.ciaddr, &test_opts());

        let dest = resolve(&req, &mut ack);
        assert_eq!(
            dest,
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 100), DHCP_CLIENT_PORT)
        );
    }

    #[test]
    fn test_discover_reply_broadcasts() {
        let req = request(MessageType::Discover, vec![]);
        let mut offer = reply::offer(&req, Ipv4Addr::new(192, 168, 1, 100), &test_opts());

        let dest = resolve(&req, &mut offer);
        assert_eq!(
            dest,
            SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT)
        );
    }

    #[test]
    fn test_init_reboot_reply_broadcasts() {
        let req = request(
            MessageType::Request,
            vec![DhcpOption::RequestedIpAddress(Ipv4Addr::new(192, 168, 1, 100))],
        );
        let mut ack = reply::ack(&req, Ipv4Addr::new(192, 168, 1, 100), &test_opts());

        let dest = resolve(&req, &mut ack);
        assert_eq!(
            dest,
            SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT)
        );
    }

    #[test]
    fn test_broadcast_flag_forces_broadcast() {
        let mut req = request(
            MessageType::Request,
            vec![
                DhcpOption::ServerIdentifier(Ipv4Addr::new(192, 168, 1, 2)),
                DhcpOption::RequestedIpAddress(Ipv4Addr::new(192, 168, 1, 100)),
            ],
        );
        req.set_broadcast();
        let mut ack = reply::ack(&req, Ipv4Addr::new(192, 168, 1, 100), &test_opts());

        let dest = resolve(&req, &mut ack);
        assert_eq!(
            dest,
            SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT)
        );
    }

    #[test]
    fn test_selecting_unicast_goes_to_yiaddr() {
        // SELECTING with the broadcast bit clear: pre-ARP unicast to yiaddr
        let req = request(
            MessageType::Request,
            vec![
                DhcpOption::ServerIdentifier(Ipv4Addr::new(192, 168, 1, 2)),
                DhcpOption::RequestedIpAddress(Ipv4Addr::new(192, 168, 1, 100)),
            ],
        );
        let mut ack = reply::ack(&req, Ipv4Addr::new(192, 168, 1, 100), &test_opts());

        let dest = resolve(&req, &mut ack);
        assert_eq!(
            dest,
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 100), DHCP_CLIENT_PORT)
        );
    }
}
