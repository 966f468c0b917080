pub mod config;
pub mod dest;
pub mod error;
pub mod handler;
pub mod lease;
pub mod options;
pub mod packet;
pub mod pool;
pub mod reply;
pub mod server;
pub mod sink;

pub use config::Config;
pub use error::{Error, Result};
pub use handler::{ClientState, State};
pub use lease::{Binding, ClientId, LeaseTable};
pub use options::{DhcpOption, MessageType, OptionCode};
pub use packet::DhcpPacket;
pub use pool::AddressPool;
pub use reply::ReplyOptions;
pub use server::DhcpServer;
pub use sink::{PacketSink, UdpSink};
