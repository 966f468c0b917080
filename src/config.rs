use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::reply::ReplyOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub pool_start: Ipv4Addr,
    pub pool_end: Ipv4Addr,
    pub router: Ipv4Addr,
    pub dns_servers: Vec<Ipv4Addr>,
    pub domain_name: Option<String>,
    pub lease_secs: u32,
    pub renewal_secs: Option<u32>,
    pub rebinding_secs: Option<u32>,
    pub interface: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_ip: Ipv4Addr::new(192, 168, 1, 2),
            subnet: Ipv4Addr::new(192, 168, 1, 0),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            pool_start: Ipv4Addr::new(192, 168, 1, 100),
            pool_end: Ipv4Addr::new(192, 168, 1, 200),
            router: Ipv4Addr::new(192, 168, 1, 1),
            dns_servers: vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)],
            domain_name: None,
            lease_secs: 86400,
            renewal_secs: None,
            rebinding_secs: None,
            interface: None,
        }
    }
}

impl Config {
    pub async fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path).await?;
            Ok(config)
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Checked once at startup; a server that comes up never re-validates.
    pub fn validate(&self) -> Result<()> {
        if !Self::is_valid_subnet_mask(self.subnet_mask) {
            return Err(Error::InvalidConfig(format!(
                "invalid subnet mask: {} (must be contiguous)",
                self.subnet_mask
            )));
        }

        let mask = u32::from(self.subnet_mask);
        if u32::from(self.subnet) & mask != u32::from(self.subnet) {
            return Err(Error::InvalidConfig(format!(
                "subnet {} is not a network address for mask {}",
                self.subnet, self.subnet_mask
            )));
        }

        if !self.subnet_contains(self.server_ip) {
            return Err(Error::InvalidConfig(
                "server_ip must be inside the subnet".to_string(),
            ));
        }

        let start = u32::from(self.pool_start);
        let end = u32::from(self.pool_end);

        if start > end {
            return Err(Error::InvalidConfig(
                "pool_start must be less than or equal to pool_end".to_string(),
            ));
        }

        if !self.subnet_contains(self.pool_start) || !self.subnet_contains(self.pool_end) {
            return Err(Error::InvalidConfig(
                "the address pool must be inside the subnet".to_string(),
            ));
        }

        for (name, reserved) in [
            ("server_ip", self.server_ip),
            ("router", self.router),
            ("broadcast address", self.broadcast_address()),
        ] {
            let addr = u32::from(reserved);
            if addr >= start && addr <= end {
                return Err(Error::InvalidConfig(format!(
                    "{} ({}) must not be within the pool range",
                    name, reserved
                )));
            }
        }

        if self.lease_secs == 0 {
            return Err(Error::InvalidConfig(
                "lease_secs must be greater than 0".to_string(),
            ));
        }

        let t1 = self.renewal_time();
        let t2 = self.rebinding_time();
        if t1 >= t2 || t2 >= self.lease_secs {
            return Err(Error::InvalidConfig(format!(
                "renewal/rebinding times must satisfy T1 < T2 < lease, got {} / {} / {}",
                t1, t2, self.lease_secs
            )));
        }

        Ok(())
    }

    fn is_valid_subnet_mask(mask: Ipv4Addr) -> bool {
        let mask_bits = u32::from(mask);
        if mask_bits == 0 {
            return false;
        }
        let inverted = !mask_bits;
        inverted.count_ones() == inverted.trailing_ones()
    }

    pub fn subnet_contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & u32::from(self.subnet_mask) == u32::from(self.subnet)
    }

    pub fn ip_in_pool(&self, ip: Ipv4Addr) -> bool {
        let addr = u32::from(ip);
        addr >= u32::from(self.pool_start) && addr <= u32::from(self.pool_end)
    }

    pub fn pool_size(&self) -> u32 {
        u32::from(self.pool_end) - u32::from(self.pool_start) + 1
    }

    pub fn broadcast_address(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.subnet) | !u32::from(self.subnet_mask))
    }

    /// T1, defaulting to half the lease.
    pub fn renewal_time(&self) -> u32 {
        self.renewal_secs.unwrap_or(self.lease_secs / 2)
    }

    /// T2, defaulting to 7/8 of the lease.
    pub fn rebinding_time(&self) -> u32 {
        self.rebinding_secs.unwrap_or(self.lease_secs / 8 * 7)
    }

    /// The immutable option snapshot shared with every worker.
    pub fn reply_options(&self) -> ReplyOptions {
        ReplyOptions {
            server_ip: self.server_ip,
            subnet_mask: self.subnet_mask,
            router: self.router,
            dns_servers: self.dns_servers.clone(),
            domain_name: self.domain_name.clone(),
            lease_secs: self.lease_secs,
            renewal_secs: self.renewal_time(),
            rebinding_secs: self.rebinding_time(),
        }
    }
}
