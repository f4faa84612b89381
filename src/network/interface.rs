//! Local interface inspection.

use std::net::{IpAddr, Ipv4Addr};

use pnet::datalink::{self, NetworkInterface};

use crate::error::{NetworkError, Result};

/// First interface that is up, not loopback, and carries an IPv4 address.
pub fn find_interface() -> Result<NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.is_up() && !iface.is_loopback() && ipv4_of(iface).is_some())
        .ok_or_else(|| NetworkError::NoInterface.into())
}

/// First IPv4 address assigned to the interface.
pub fn ipv4_of(interface: &NetworkInterface) -> Option<Ipv4Addr> {
    interface.ips.iter().find_map(|network| match network.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() => Some(ip),
        _ => None,
    })
}

/// IPv4 address of the first usable interface on this host.
pub fn local_ipv4() -> Result<Ipv4Addr> {
    let interface = find_interface()?;
    ipv4_of(&interface).ok_or_else(|| NetworkError::NoInterface.into())
}
