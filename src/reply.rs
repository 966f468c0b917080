use std::net::Ipv4Addr;

use crate::options::{DhcpOption, MessageType};
use crate::packet::{BOOTREPLY, DhcpPacket};

/// Immutable snapshot of the configuration fields that go into every
/// OFFER/ACK. Built once at startup and shared without locking.
#[derive(Debug, Clone)]
pub struct ReplyOptions {
    pub server_ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub router: Ipv4Addr,
    pub dns_servers: Vec<Ipv4Addr>,
    pub domain_name: Option<String>,
    pub lease_secs: u32,
    pub renewal_secs: u32,
    pub rebinding_secs: u32,
}

impl ReplyOptions {
    /// True when `ip` lies in the subnet the server serves.
    pub fn subnet_contains(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.subnet_mask);
        u32::from(ip) & mask == u32::from(self.server_ip) & mask
    }
}

fn reply_header(request: &DhcpPacket) -> DhcpPacket {
    DhcpPacket {
        op: BOOTREPLY,
        htype: request.htype,
        hlen: request.hlen,
        hops: 0,
        xid: request.xid,
        secs: 0,
        flags: request.flags,
        ciaddr: Ipv4Addr::UNSPECIFIED,
        yiaddr: Ipv4Addr::UNSPECIFIED,
        siaddr: Ipv4Addr::UNSPECIFIED,
        giaddr: request.giaddr,
        chaddr: request.chaddr,
        sname: [0u8; 64],
        file: [0u8; 128],
        options: Vec::new(),
    }
}

fn lease_options(opts: &ReplyOptions) -> Vec<DhcpOption> {
    let mut options = vec![
        DhcpOption::SubnetMask(opts.subnet_mask),
        DhcpOption::Router(vec![opts.router]),
        DhcpOption::DnsServer(opts.dns_servers.clone()),
        DhcpOption::LeaseTime(opts.lease_secs),
        DhcpOption::ServerIdentifier(opts.server_ip),
        DhcpOption::RenewalTime(opts.renewal_secs),
        DhcpOption::RebindingTime(opts.rebinding_secs),
    ];
    if let Some(ref domain) = opts.domain_name {
        options.push(DhcpOption::DomainName(domain.clone()));
    }
    options
}

/// Builds a DHCPOFFER for `request` assigning `yiaddr`.
pub fn offer(request: &DhcpPacket, yiaddr: Ipv4Addr, opts: &ReplyOptions) -> DhcpPacket {
    let mut reply = reply_header(request);
    reply.yiaddr = yiaddr;
    reply.siaddr = opts.server_ip;

    reply.options.push(DhcpOption::MessageType(MessageType::Offer));
    reply.options.extend(lease_options(opts));
    reply
}

/// Builds a DHCPACK; identical to the offer apart from the message type and
/// the echoed `ciaddr`.
pub fn ack(request: &DhcpPacket, yiaddr: Ipv4Addr, opts: &ReplyOptions) -> DhcpPacket {
    let mut reply = reply_header(request);
    reply.ciaddr = request.ciaddr;
    reply.yiaddr = yiaddr;
    reply.siaddr = opts.server_ip;

    reply.options.push(DhcpOption::MessageType(MessageType::Ack));
    reply.options.extend(lease_options(opts));
    reply
}

/// Builds a DHCPNAK: zero ciaddr/yiaddr, message type and server identifier
/// only. The destination resolver broadcasts it, and sets the broadcast
/// flag when the reply travels through a relay.
pub fn nak(request: &DhcpPacket, opts: &ReplyOptions) -> DhcpPacket {
    let mut reply = reply_header(request);
    reply.siaddr = opts.server_ip;

    reply.options.push(DhcpOption::MessageType(MessageType::Nak));
    reply
        .options
        .push(DhcpOption::ServerIdentifier(opts.server_ip));
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::BOOTREQUEST;

    fn test_reply_options() -> ReplyOptions {
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

    fn test_request() -> DhcpPacket {
        let mut chaddr = [0u8; 16];
        chaddr[..6].copy_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        DhcpPacket {
            op: BOOTREQUEST,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 0x1234,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            options: vec![DhcpOption::MessageType(MessageType::Discover)],
        }
    }

    #[test]
    fn test_offer_layout() {
        let request = test_request();
        let opts = test_reply_options();
        let reply = offer(&request, Ipv4Addr::new(192, 168, 1, 100), &opts);

        assert_eq!(reply.op, BOOTREPLY);
        assert_eq!(reply.xid, request.xid);
        assert_eq!(reply.chaddr, request.chaddr);
        assert_eq!(reply.ciaddr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(reply.siaddr, opts.server_ip);
        assert_eq!(reply.message_type(), Some(MessageType::Offer));

        let codes: Vec<u8> = reply.options.iter().map(|option| option.code()).collect();
        assert_eq!(codes, vec![53, 1, 3, 6, 51, 54, 58, 59]);

        assert_eq!(reply.get_option(51), Some(3600u32.to_be_bytes().to_vec()));
        assert_eq!(reply.get_option(54), Some(vec![192, 168, 1, 2]));
        assert_eq!(reply.get_option(58), Some(1800u32.to_be_bytes().to_vec()));
        assert_eq!(reply.get_option(59), Some(3150u32.to_be_bytes().to_vec()));
    }

    #[test]
    fn test_offer_includes_domain_name_when_configured() {
        let request = test_request();
        let mut opts = test_reply_options();
        opts.domain_name = Some("example.local".to_string());

        let reply = offer(&request, Ipv4Addr::new(192, 168, 1, 100), &opts);
        assert_eq!(reply.get_option(15), Some(b"example.local".to_vec()));
    }

    #[test]
    fn test_ack_echoes_ciaddr() {
        let mut request = test_request();
        request.ciaddr = Ipv4Addr::new(192, 168, 1, 100);
        let opts = test_reply_options();

        let reply = ack(&request, request.ciaddr, &opts);
        assert_eq!(reply.message_type(), Some(MessageType::Ack));
        assert_eq!(reply.ciaddr, Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 168, 1, 100));
    }

    #[test]
    fn test_nak_layout() {
        let mut request = test_request();
        request.ciaddr = Ipv4Addr::new(192, 168, 1, 100);
        let opts = test_reply_options();

        let reply = nak(&request, &opts);
        assert_eq!(reply.message_type(), Some(MessageType::Nak));
        assert_eq!(reply.ciaddr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(reply.yiaddr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(reply.xid, request.xid);
        assert_eq!(reply.chaddr, request.chaddr);
        assert!(!reply.is_broadcast());

        let codes: Vec<u8> = reply.options.iter().map(|option| option.code()).collect();
        assert_eq!(codes, vec![53, 54]);
    }

    #[test]
    fn test_nak_through_relay_keeps_flags() {
        let mut request = test_request();
        request.giaddr = Ipv4Addr::new(192, 168, 5, 1);
        let opts = test_reply_options();

        let reply = nak(&request, &opts);
        assert_eq!(reply.giaddr, request.giaddr);
        // the destination resolver sets the broadcast flag for the relay leg
        assert!(!reply.is_broadcast());
    }
}
