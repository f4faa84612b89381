//! LAN device discovery.
//!
//! This module provides:
//! - Active TCP probing of a /24 subnet
//! - ARP and mDNS enrichment of discovered devices
//! - A persistent device registry with new-device alerts

pub mod alerts;
mod device;
pub mod hostname;
pub mod mdns;
pub mod neighbors;
pub mod oui;
pub mod prober;
mod registry;
pub mod scanner;
mod subnet;

pub use alerts::{AlertSender, AlertStream, DeviceAlert};
pub use device::{Device, UNKNOWN_DEVICE_TYPE, upgrade};
pub use hostname::{HostnameLookup, SystemLookup};
pub use mdns::{MdnsBrowser, ServiceBrowser, ServiceSighting};
pub use neighbors::{Neighbor, NeighborSource, ProcNetArp};
pub use prober::{HostProbe, Prober, ServicePort, WELL_KNOWN_SERVICES};
pub use registry::{DeviceRegistry, Upsert};
pub use scanner::{CycleReport, ScanPhase, ScanSettings, Scanner};
pub use subnet::SubnetPrefix;
