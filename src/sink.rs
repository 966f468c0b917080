use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::config::Config;
use crate::dest::DHCP_SERVER_PORT;
use crate::error::{Error, Result};

/// Where replies leave the server.
///
/// The runtime hands the sink a UDP-semantic destination and an opaque
/// payload; whether delivery happens over a plain UDP socket or a raw
/// link-layer frame for clients that cannot yet receive unicast is the
/// implementation's business.
#[async_trait]
pub trait PacketSink: Send + Sync {
    async fn send(&self, dest: SocketAddrV4, payload: &[u8]) -> Result<()>;
}

/// Default sink: the server's broadcast-capable UDP socket.
pub struct UdpSink {
    socket: Arc<UdpSocket>,
}

impl UdpSink {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl PacketSink for UdpSink {
    async fn send(&self, dest: SocketAddrV4, payload: &[u8]) -> Result<()> {
        self.socket.send_to(payload, SocketAddr::V4(dest)).await?;
        Ok(())
    }
}

/// Binds the server socket on 0.0.0.0:67 with SO_REUSEADDR and
/// SO_BROADCAST, optionally pinned to an interface so replies egress on
/// the right link before the client has an address.
pub fn bind_socket(config: &Config) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

    socket
        .set_reuse_address(true)
        .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

    socket
        .set_broadcast(true)
        .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

    socket
        .set_nonblocking(true)
        .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

    if let Some(ref interface) = config.interface {
        #[cfg(target_os = "linux")]
        {
            socket
                .bind_device(Some(interface.as_bytes()))
                .map_err(|error| {
                    Error::Socket(format!("Failed to bind to device {}: {}", interface, error))
                })?;
            tracing::info!(interface, "bound to device");
        }
        #[cfg(not(target_os = "linux"))]
        tracing::warn!(
            interface,
            "interface binding is only supported on Linux and will be ignored"
        );
    }

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DHCP_SERVER_PORT);
    socket
        .bind(&bind_addr.into())
        .map_err(|error| Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error)))?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
        .map_err(|error| Error::Socket(format!("Failed to convert to tokio socket: {}", error)))
}
