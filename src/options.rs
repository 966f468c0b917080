use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    Pad = 0,
    SubnetMask = 1,
    Router = 3,
    DnsServer = 6,
    DomainName = 15,
    RequestedIpAddress = 50,
    LeaseTime = 51,
    MessageType = 53,
    ServerIdentifier = 54,
    ParameterRequestList = 55,
    RenewalTime = 58,
    RebindingTime = 59,
    ClientIdentifier = 61,
    End = 255,
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pad),
            1 => Ok(Self::SubnetMask),
            3 => Ok(Self::Router),
            6 => Ok(Self::DnsServer),
            15 => Ok(Self::DomainName),
            50 => Ok(Self::RequestedIpAddress),
            51 => Ok(Self::LeaseTime),
            53 => Ok(Self::MessageType),
            54 => Ok(Self::ServerIdentifier),
            55 => Ok(Self::ParameterRequestList),
            58 => Ok(Self::RenewalTime),
            59 => Ok(Self::RebindingTime),
            61 => Ok(Self::ClientIdentifier),
            255 => Ok(Self::End),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

/// A single decoded TLV from the option region.
///
/// Codes the server neither consumes nor emits are carried as [`Unknown`]
/// so they survive a decode/encode round trip, and so is a known code whose
/// value has an unexpected shape — a bad value never fails the packet it
/// arrived in.
///
/// [`Unknown`]: DhcpOption::Unknown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    SubnetMask(Ipv4Addr),
    Router(Vec<Ipv4Addr>),
    DnsServer(Vec<Ipv4Addr>),
    DomainName(String),
    RequestedIpAddress(Ipv4Addr),
    LeaseTime(u32),
    MessageType(MessageType),
    ServerIdentifier(Ipv4Addr),
    ParameterRequestList(Vec<u8>),
    RenewalTime(u32),
    RebindingTime(u32),
    ClientIdentifier(Vec<u8>),
    Unknown(u8, Vec<u8>),
}

fn ipv4(data: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = data.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}

fn ipv4_list(data: &[u8]) -> Option<Vec<Ipv4Addr>> {
    if data.is_empty() || data.len() % 4 != 0 {
        return None;
    }
    Some(
        data.chunks_exact(4)
            .map(|chunk| Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]))
            .collect(),
    )
}

fn u32_be(data: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = data.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

impl DhcpOption {
    pub fn parse(code: u8, data: &[u8]) -> Self {
        Self::parse_known(code, data).unwrap_or_else(|| Self::Unknown(code, data.to_vec()))
    }

    fn parse_known(code: u8, data: &[u8]) -> Option<Self> {
        match OptionCode::try_from(code).ok()? {
            OptionCode::SubnetMask => Some(Self::SubnetMask(ipv4(data)?)),
            OptionCode::Router => Some(Self::Router(ipv4_list(data)?)),
            OptionCode::DnsServer => Some(Self::DnsServer(ipv4_list(data)?)),
            OptionCode::DomainName => {
                Some(Self::DomainName(String::from_utf8_lossy(data).to_string()))
            }
            OptionCode::RequestedIpAddress => Some(Self::RequestedIpAddress(ipv4(data)?)),
            OptionCode::LeaseTime => Some(Self::LeaseTime(u32_be(data)?)),
            OptionCode::MessageType => {
                let value: [u8; 1] = data.try_into().ok()?;
                Some(Self::MessageType(MessageType::try_from(value[0]).ok()?))
            }
            OptionCode::ServerIdentifier => Some(Self::ServerIdentifier(ipv4(data)?)),
            OptionCode::ParameterRequestList => Some(Self::ParameterRequestList(data.to_vec())),
            OptionCode::RenewalTime => Some(Self::RenewalTime(u32_be(data)?)),
            OptionCode::RebindingTime => Some(Self::RebindingTime(u32_be(data)?)),
            OptionCode::ClientIdentifier => Some(Self::ClientIdentifier(data.to_vec())),
            OptionCode::Pad | OptionCode::End => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => OptionCode::SubnetMask as u8,
            Self::Router(_) => OptionCode::Router as u8,
            Self::DnsServer(_) => OptionCode::DnsServer as u8,
            Self::DomainName(_) => OptionCode::DomainName as u8,
            Self::RequestedIpAddress(_) => OptionCode::RequestedIpAddress as u8,
            Self::LeaseTime(_) => OptionCode::LeaseTime as u8,
            Self::MessageType(_) => OptionCode::MessageType as u8,
            Self::ServerIdentifier(_) => OptionCode::ServerIdentifier as u8,
            Self::ParameterRequestList(_) => OptionCode::ParameterRequestList as u8,
            Self::RenewalTime(_) => OptionCode::RenewalTime as u8,
            Self::RebindingTime(_) => OptionCode::RebindingTime as u8,
            Self::ClientIdentifier(_) => OptionCode::ClientIdentifier as u8,
            Self::Unknown(code, _) => *code,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::SubnetMask(addr) => {
                let mut result = vec![OptionCode::SubnetMask as u8, 4];
                result.extend_from_slice(&addr.octets());
                result
            }
            Self::Router(addrs) => {
                let mut result = vec![OptionCode::Router as u8, (addrs.len() * 4) as u8];
                for addr in addrs {
                    result.extend_from_slice(&addr.octets());
                }
                result
            }
            Self::DnsServer(addrs) => {
                let mut result = vec![OptionCode::DnsServer as u8, (addrs.len() * 4) as u8];
                for addr in addrs {
                    result.extend_from_slice(&addr.octets());
                }
                result
            }
            Self::DomainName(name) => {
                let bytes = name.as_bytes();
                let mut result = vec![OptionCode::DomainName as u8, bytes.len() as u8];
                result.extend_from_slice(bytes);
                result
            }
            Self::RequestedIpAddress(addr) => {
                let mut result = vec![OptionCode::RequestedIpAddress as u8, 4];
                result.extend_from_slice(&addr.octets());
                result
            }
            Self::LeaseTime(time) => {
                let mut result = vec![OptionCode::LeaseTime as u8, 4];
                result.extend_from_slice(&time.to_be_bytes());
                result
            }
            Self::MessageType(msg_type) => {
                vec![OptionCode::MessageType as u8, 1, *msg_type as u8]
            }
            Self::ServerIdentifier(addr) => {
                let mut result = vec![OptionCode::ServerIdentifier as u8, 4];
                result.extend_from_slice(&addr.octets());
                result
            }
            Self::ParameterRequestList(params) => {
                let mut result = vec![OptionCode::ParameterRequestList as u8, params.len() as u8];
                result.extend_from_slice(params);
                result
            }
            Self::RenewalTime(time) => {
                let mut result = vec![OptionCode::RenewalTime as u8, 4];
                result.extend_from_slice(&time.to_be_bytes());
                result
            }
            Self::RebindingTime(time) => {
                let mut result = vec![OptionCode::RebindingTime as u8, 4];
                result.extend_from_slice(&time.to_be_bytes());
                result
            }
            Self::ClientIdentifier(data) => {
                let mut result = vec![OptionCode::ClientIdentifier as u8, data.len() as u8];
                result.extend_from_slice(data);
                result
            }
            Self::Unknown(code, data) => {
                let mut result = vec![*code, data.len() as u8];
                result.extend_from_slice(data);
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for value in 1..=8u8 {
            let msg_type = MessageType::try_from(value).unwrap();
            assert_eq!(msg_type as u8, value);
        }
        assert!(MessageType::try_from(9).is_err());
    }

    #[test]
    fn test_subnet_mask_encode_decode() {
        let original = DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0));
        let encoded = original.encode();
        assert_eq!(encoded, vec![1, 4, 255, 255, 255, 0]);

        let decoded = DhcpOption::parse(1, &[255, 255, 255, 0]);
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_lease_time_encoding() {
        let option = DhcpOption::LeaseTime(3600);
        let encoded = option.encode();
        assert_eq!(encoded, vec![51, 4, 0, 0, 14, 16]);

        let decoded = DhcpOption::parse(51, &encoded[2..]);
        assert_eq!(decoded, DhcpOption::LeaseTime(3600));
    }

    #[test]
    fn test_dns_list_concatenates_addresses() {
        let option = DhcpOption::DnsServer(vec![
            Ipv4Addr::new(8, 8, 8, 8),
            Ipv4Addr::new(1, 1, 1, 1),
        ]);
        let encoded = option.encode();
        assert_eq!(encoded, vec![6, 8, 8, 8, 8, 8, 1, 1, 1, 1]);
    }

    #[test]
    fn test_malformed_known_option_falls_back_to_raw() {
        assert_eq!(
            DhcpOption::parse(1, &[255, 255, 255]),
            DhcpOption::Unknown(1, vec![255, 255, 255])
        );
        assert_eq!(
            DhcpOption::parse(50, &[192, 168]),
            DhcpOption::Unknown(50, vec![192, 168])
        );
        assert_eq!(
            DhcpOption::parse(51, &[0, 0, 0]),
            DhcpOption::Unknown(51, vec![0, 0, 0])
        );
        assert_eq!(
            DhcpOption::parse(53, &[1, 2]),
            DhcpOption::Unknown(53, vec![1, 2])
        );
        // an out-of-range message type code is raw bytes too
        assert_eq!(DhcpOption::parse(53, &[9]), DhcpOption::Unknown(53, vec![9]));
        assert_eq!(DhcpOption::parse(6, &[]), DhcpOption::Unknown(6, vec![]));
    }

    #[test]
    fn test_unknown_option_preserved() {
        let decoded = DhcpOption::parse(43, &[1, 2, 3]);
        assert_eq!(decoded, DhcpOption::Unknown(43, vec![1, 2, 3]));
        assert_eq!(decoded.encode(), vec![43, 3, 1, 2, 3]);
    }

    #[test]
    fn test_renewal_and_rebinding_times() {
        let t1 = DhcpOption::RenewalTime(1800);
        let t2 = DhcpOption::RebindingTime(3150);
        assert_eq!(t1.encode()[0], 58);
        assert_eq!(t2.encode()[0], 59);
        assert_eq!(
            DhcpOption::parse(58, &1800u32.to_be_bytes()),
            DhcpOption::RenewalTime(1800)
        );
        assert_eq!(
            DhcpOption::parse(59, &3150u32.to_be_bytes()),
            DhcpOption::RebindingTime(3150)
        );
    }
}
