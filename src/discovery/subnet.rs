//! The /24 network scanned by the discovery pipeline.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use tracing::warn;

use crate::error::ValidationError;
use crate::network;

/// First three octets of an IPv4 /24 network, e.g. `192.168.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubnetPrefix([u8; 3]);

impl SubnetPrefix {
    /// Used when no interface can be inspected.
    pub const FALLBACK: Self = Self([192, 168, 1]);

    pub const fn new(a: u8, b: u8, c: u8) -> Self {
        Self([a, b, c])
    }

    /// The prefix of the network `ip` belongs to.
    pub const fn of(ip: Ipv4Addr) -> Self {
        let [a, b, c, _] = ip.octets();
        Self([a, b, c])
    }

    /// Address of host `last` inside this network.
    pub const fn host(&self, last: u8) -> Ipv4Addr {
        let [a, b, c] = self.0;
        Ipv4Addr::new(a, b, c, last)
    }

    /// All 254 host addresses, `.1` through `.254`.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        let prefix = *self;
        (1..=254).map(move |last| prefix.host(last))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        Self::of(ip) == *self
    }

    /// Derive the prefix from the first usable local interface, falling back
    /// to [`SubnetPrefix::FALLBACK`].
    pub fn detect() -> Self {
        match network::local_ipv4() {
            Ok(ip) => Self::of(ip),
            Err(err) => {
                warn!(error = %err, fallback = %Self::FALLBACK, "subnet auto-detection failed");
                Self::FALLBACK
            }
        }
    }
}

impl fmt::Display for SubnetPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

impl FromStr for SubnetPrefix {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidSubnet {
            value: s.to_string(),
        };

        let mut octets = [0u8; 3];
        let mut parts = s.trim().split('.');
        for octet in &mut octets {
            *octet = parts
                .next()
                .and_then(|part| part.parse().ok())
                .ok_or_else(invalid)?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(octets))
    }
}
