//! Reverse DNS lookup for freshly discovered hosts.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;

/// Source of an initial hostname for a new device.
pub trait HostnameLookup: Send + Sync + 'static {
    /// Best-effort reverse lookup; `None` when nothing useful is known.
    fn lookup(&self, ip: Ipv4Addr) -> impl Future<Output = Option<String>> + Send;
}

/// Reverse lookup through the operating system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLookup;

impl HostnameLookup for SystemLookup {
    async fn lookup(&self, ip: Ipv4Addr) -> Option<String> {
        let resolved = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&IpAddr::V4(ip)))
            .await
            .ok()?;

        match resolved {
            Ok(name) => clean_hostname(ip, &name),
            Err(err) => {
                debug!(%ip, error = %err, "reverse lookup failed");
                None
            }
        }
    }
}

/// Trim the trailing dot and discard answers that merely echo the address.
fn clean_hostname(ip: Ipv4Addr, name: &str) -> Option<String> {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() || name == ip.to_string() {
        return None;
    }
    Some(name.to_string())
}
