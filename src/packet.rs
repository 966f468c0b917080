use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::options::{DhcpOption, MessageType, OptionCode};

pub const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;

/// Smallest frame a receiver must accept: fixed header plus magic cookie.
pub const MIN_PACKET_SIZE: usize = 240;
/// BOOTP minimum reply size; encoded packets are zero-padded up to this.
const MIN_REPLY_SIZE: usize = 300;

const BROADCAST_FLAG: u16 = 0x8000;

/// A decoded DHCPv4 message: the 236-byte BOOTP fixed header plus the
/// ordered option list that follows the magic cookie.
#[derive(Debug, Clone)]
pub struct DhcpPacket {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: [u8; 64],
    pub file: [u8; 128],
    pub options: Vec<DhcpOption>,
}

impl DhcpPacket {
    /// Decodes a datagram.
    ///
    /// Fails with [`Error::PacketTooShort`] under 240 bytes and
    /// [`Error::BadMagicCookie`] when bytes 236..240 are not the DHCP
    /// cookie. `hlen` is clamped to the 16-byte `chaddr` field.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_PACKET_SIZE {
            return Err(Error::PacketTooShort(data.len()));
        }

        if data[236..240] != DHCP_MAGIC_COOKIE {
            return Err(Error::BadMagicCookie);
        }

        let op = data[0];
        let htype = data[1];
        let hlen = data[2].min(16);
        let hops = data[3];

        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let secs = u16::from_be_bytes([data[8], data[9]]);
        let flags = u16::from_be_bytes([data[10], data[11]]);

        let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[28..44]);

        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[44..108]);

        let mut file = [0u8; 128];
        file.copy_from_slice(&data[108..236]);

        let options = Self::parse_options(&data[240..])?;

        Ok(Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    /// Walks the option region TLV-by-TLV.
    ///
    /// PAD is skipped, END stops the walk. Running out of bytes cleanly
    /// between TLVs is accepted; a TLV cut off mid-header or mid-value is a
    /// [`Error::TruncatedOption`].
    fn parse_options(data: &[u8]) -> Result<Vec<DhcpOption>> {
        let mut options = Vec::new();
        let mut index = 0;

        while index < data.len() {
            let code = data[index];

            if code == OptionCode::Pad as u8 {
                index += 1;
                continue;
            }

            if code == OptionCode::End as u8 {
                break;
            }

            if index + 1 >= data.len() {
                return Err(Error::TruncatedOption);
            }

            let length = data[index + 1] as usize;

            if index + 2 + length > data.len() {
                return Err(Error::TruncatedOption);
            }

            let option = DhcpOption::parse(code, &data[index + 2..index + 2 + length]);
            options.push(option);

            index += 2 + length;
        }

        Ok(options)
    }

    /// Encodes the fixed header, the magic cookie, the option list, and a
    /// terminating END byte, zero-padded to the 300-byte BOOTP minimum.
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(MIN_REPLY_SIZE);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen);
        packet.push(self.hops);

        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());

        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());

        packet.extend_from_slice(&self.chaddr);
        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);

        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        for option in &self.options {
            packet.extend_from_slice(&option.encode());
        }

        packet.push(OptionCode::End as u8);

        while packet.len() < MIN_REPLY_SIZE {
            packet.push(0);
        }

        packet
    }

    /// Raw value of the last occurrence of `code`, if present.
    ///
    /// Duplicate tags: last occurrence wins, so all accessors scan from the
    /// back of the list.
    pub fn get_option(&self, code: u8) -> Option<Vec<u8>> {
        self.options
            .iter()
            .rev()
            .find(|option| option.code() == code)
            .map(|option| option.encode()[2..].to_vec())
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.options.iter().rev().find_map(|option| match option {
            DhcpOption::MessageType(msg_type) => Some(*msg_type),
            _ => None,
        })
    }

    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        self.options.iter().rev().find_map(|option| match option {
            DhcpOption::RequestedIpAddress(ip) => Some(*ip),
            _ => None,
        })
    }

    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.options.iter().rev().find_map(|option| match option {
            DhcpOption::ServerIdentifier(ip) => Some(*ip),
            _ => None,
        })
    }

    pub fn client_identifier(&self) -> Option<&[u8]> {
        self.options.iter().rev().find_map(|option| match option {
            DhcpOption::ClientIdentifier(id) => Some(id.as_slice()),
            _ => None,
        })
    }

    pub fn parameter_request_list(&self) -> Option<&[u8]> {
        self.options.iter().rev().find_map(|option| match option {
            DhcpOption::ParameterRequestList(params) => Some(params.as_slice()),
            _ => None,
        })
    }

    pub fn is_broadcast(&self) -> bool {
        (self.flags & BROADCAST_FLAG) != 0
    }

    pub fn set_broadcast(&mut self) {
        self.flags |= BROADCAST_FLAG;
    }
}
