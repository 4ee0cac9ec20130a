use crate::{PingError, PingResult};
use std::fmt;
use std::net::IpAddr;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl From<IpAddr> for AddressFamily {
    fn from(ip_addr: IpAddr) -> Self {
        match ip_addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// The single destination probed for the lifetime of one run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Target {
    pub host: String,
    pub ip_addr: IpAddr,
    pub family: AddressFamily,
}

impl Target {
    pub fn from_ip_addr(ip_addr: IpAddr) -> Self {
        Target { host: ip_addr.to_string(), ip_addr, family: ip_addr.into() }
    }
}

/// Resolves `host` to exactly one address. Literal addresses skip DNS; for names the first
/// address returned by the system resolver wins.
pub fn resolve(host: &str) -> PingResult<Target> {
    if let Ok(ip_addr) = host.parse::<IpAddr>() {
        return Ok(Target { host: host.to_owned(), ..Target::from_ip_addr(ip_addr) });
    }

    let ips: Vec<IpAddr> = dns_lookup::lookup_host(host)
        .map_err(|e| PingError::Resolution { host: host.to_owned(), message: e.to_string() })?;
    let ip_addr = ips.into_iter().next().ok_or_else(|| PingError::Resolution {
        host: host.to_owned(),
        message: "no address found".to_owned(),
    })?;
    tracing::debug!("resolved {} to {}", host, ip_addr);

    Ok(Target { host: host.to_owned(), ip_addr, family: ip_addr.into() })
}
