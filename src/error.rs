use std::net::Ipv4Addr;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Packet too short: {0} bytes (minimum 240)")]
    PacketTooShort(usize),

    #[error("Invalid magic cookie")]
    BadMagicCookie,

    #[error("Option data truncated")]
    TruncatedOption,

    #[error("No available IP addresses in pool")]
    PoolExhausted,

    #[error("Invalid pool range: {0} > {1}")]
    InvalidPoolRange(Ipv4Addr, Ipv4Addr),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Socket error: {0}")]
    Socket(String),
}

pub type Result<T> = std::result::Result<T, Error>;
