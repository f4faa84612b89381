//! ARP neighbor table enrichment.
//!
//! Attaches MAC addresses (and the derived vendor) to known devices and
//! passively adds hosts that never answered a probe.

use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use pnet::util::MacAddr;
use tracing::debug;

use super::device::Device;
use super::registry::{DeviceRegistry, Upsert};
use super::subnet::SubnetPrefix;
use crate::network::parse_mac;

/// Default location of the Linux neighbor table.
pub const PROC_NET_ARP: &str = "/proc/net/arp";

/// One resolved neighbor table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub ip: Ipv4Addr,
    /// Canonical lowercase `aa:bb:cc:dd:ee:ff` form.
    pub mac: String,
}

/// Something that can list the host's IPv4 neighbors.
pub trait NeighborSource: Send + Sync + 'static {
    fn neighbors(&self) -> io::Result<Vec<Neighbor>>;
}

/// Reads the neighbor table from procfs. Yields nothing on other platforms.
#[derive(Debug, Clone)]
pub struct ProcNetArp {
    path: PathBuf,
}

impl Default for ProcNetArp {
    fn default() -> Self {
        Self::new(PROC_NET_ARP)
    }
}

impl ProcNetArp {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl NeighborSource for ProcNetArp {
    fn neighbors(&self) -> io::Result<Vec<Neighbor>> {
        if !cfg!(target_os = "linux") {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(parse_arp_table(&content))
    }
}

/// Parse the `/proc/net/arp` format.
///
/// Columns are `IP address, HW type, Flags, HW address, Mask, Device`. Rows
/// with fewer than four fields, an unparseable address, or an incomplete
/// (all-zero) MAC are skipped.
pub fn parse_arp_table(content: &str) -> Vec<Neighbor> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            let ip = fields[0].parse().ok()?;
            let mac = parse_mac(fields[3]).ok()?;
            if mac == MacAddr::zero() {
                return None;
            }
            Some(Neighbor {
                ip,
                mac: mac.to_string(),
            })
        })
        .collect()
}

/// What one enrichment pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeighborReport {
    /// Known devices whose MAC was (re)written.
    pub updated: usize,
    /// Devices created from the neighbor table alone.
    pub discovered: usize,
}

/// Apply neighbor entries inside `subnet` to the registry.
pub fn enrich(
    registry: &DeviceRegistry,
    subnet: SubnetPrefix,
    neighbors: &[Neighbor],
    now: DateTime<Utc>,
) -> NeighborReport {
    let mut report = NeighborReport::default();

    for neighbor in neighbors.iter().filter(|n| subnet.contains(n.ip)) {
        let outcome = registry.upsert_with(
            neighbor.ip,
            || Device::new(neighbor.ip, now),
            |device| device.set_mac(neighbor.mac.as_str()),
        );
        match outcome {
            Upsert::Created => {
                debug!(ip = %neighbor.ip, mac = %neighbor.mac, "passively discovered device");
                report.discovered += 1;
            }
            Upsert::Updated => report.updated += 1,
        }
    }

    report
}

/// Read `source` and enrich the registry; read failures only produce a debug log.
pub fn run_pass(
    registry: &DeviceRegistry,
    subnet: SubnetPrefix,
    source: &impl NeighborSource,
    now: DateTime<Utc>,
) -> NeighborReport {
    match source.neighbors() {
        Ok(neighbors) => enrich(registry, subnet, &neighbors, now),
        Err(err) => {
            debug!(error = %err, "neighbor table unavailable");
            NeighborReport::default()
        }
    }
}
