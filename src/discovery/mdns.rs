//! Multicast DNS service discovery enrichment.
//!
//! Browses a fixed set of service types under one shared deadline and
//! attaches friendly names, device classes and TXT metadata to devices the
//! registry already knows. mDNS never creates devices.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, warn};

use super::registry::DeviceRegistry;

/// Service types browsed on every pass.
pub const SERVICE_TYPES: &[&str] = &[
    "_workstation._tcp",
    "_googlecast._tcp",
    "_airplay._tcp",
    "_printer._tcp",
    "_ipp._tcp",
    "_spotify-connect._tcp",
    "_hap._tcp",
    "_http._tcp",
    "_smb._tcp",
];

/// Deadline shared by every browse in one pass.
pub const DEFAULT_BROWSE_DEADLINE: Duration = Duration::from_secs(5);

const LOCAL_DOMAIN: &str = "local.";

/// A resolved service instance advertised by some host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSighting {
    pub addr: Ipv4Addr,
    /// Instance name as advertised, e.g. `Office Printer@nas`.
    pub instance: String,
    /// Service type without the domain, e.g. `_ipp._tcp`.
    pub service_type: String,
    /// First TXT record, rendered as `key=value`.
    pub txt: Option<String>,
}

/// Coarse device class inferred from an advertised service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    ChromecastSpeaker,
    Apple,
    Printer,
    Speaker,
    SmartHome,
    ComputerNas,
    WebServer,
    Unknown,
}

impl DeviceClass {
    pub fn from_service_type(service_type: &str) -> Self {
        match service_type {
            "_googlecast._tcp" => Self::ChromecastSpeaker,
            "_airplay._tcp" => Self::Apple,
            "_printer._tcp" | "_ipp._tcp" => Self::Printer,
            "_spotify-connect._tcp" => Self::Speaker,
            "_hap._tcp" => Self::SmartHome,
            "_workstation._tcp" | "_smb._tcp" => Self::ComputerNas,
            "_http._tcp" => Self::WebServer,
            _ => Self::Unknown,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::ChromecastSpeaker => "Chromecast/Speaker",
            Self::Apple => "Apple Device",
            Self::Printer => "Printer",
            Self::Speaker => "Speaker",
            Self::SmartHome => "Smart Home",
            Self::ComputerNas => "Computer/NAS",
            Self::WebServer => "Web Server",
            Self::Unknown => super::device::UNKNOWN_DEVICE_TYPE,
        }
    }
}

/// Instance name with any `@host` suffix removed.
pub fn display_name(instance: &str) -> &str {
    instance
        .split_once('@')
        .map_or(instance, |(name, _)| name)
}

/// Apply one sighting to the device at its address.
///
/// Returns `false` when the address is not a registry key.
pub fn apply_sighting(registry: &DeviceRegistry, sighting: &ServiceSighting) -> bool {
    registry.update(sighting.addr, |device| {
        device.upgrade_friendly_name(display_name(&sighting.instance));
        device.upgrade_device_type(DeviceClass::from_service_type(&sighting.service_type).label());
        if let Some(txt) = &sighting.txt {
            device.record_service_metadata(&sighting.service_type, txt.as_str());
        }
    })
}

/// Source of service sightings.
pub trait ServiceBrowser: Send + Sync + 'static {
    /// Browse every service type until `deadline` elapses, handing each
    /// sighting to `sink` as it arrives.
    fn browse(
        &self,
        deadline: Duration,
        sink: &(dyn Fn(ServiceSighting) + Send + Sync),
    ) -> impl Future<Output = ()> + Send;
}

/// Run one enrichment pass. Returns how many sightings matched a known device.
pub async fn run_pass(
    registry: &DeviceRegistry,
    browser: &impl ServiceBrowser,
    deadline: Duration,
) -> usize {
    let applied = AtomicUsize::new(0);
    let sink = |sighting: ServiceSighting| {
        if apply_sighting(registry, &sighting) {
            applied.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!(addr = %sighting.addr, service = %sighting.service_type, "ignoring sighting for unknown device");
        }
    };
    browser.browse(deadline, &sink).await;
    applied.into_inner()
}

/// Browser backed by an `mdns-sd` daemon created for each pass.
#[derive(Debug, Clone)]
pub struct MdnsBrowser {
    service_types: Vec<String>,
}

impl Default for MdnsBrowser {
    fn default() -> Self {
        Self::new(SERVICE_TYPES.iter().copied())
    }
}

impl MdnsBrowser {
    pub fn new<'a>(service_types: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            service_types: service_types.into_iter().map(str::to_string).collect(),
        }
    }
}

impl ServiceBrowser for MdnsBrowser {
    async fn browse(&self, deadline: Duration, sink: &(dyn Fn(ServiceSighting) + Send + Sync)) {
        let daemon = match ServiceDaemon::new() {
            Ok(daemon) => daemon,
            Err(err) => {
                warn!(error = %err, "mDNS unavailable, skipping enrichment");
                return;
            }
        };

        let mut browsed = Vec::new();
        let mut streams = Vec::new();
        for service_type in &self.service_types {
            let query = format!("{service_type}.{LOCAL_DOMAIN}");
            match daemon.browse(&query) {
                Ok(receiver) => {
                    streams.push(receiver.into_stream());
                    browsed.push(query);
                }
                Err(err) => debug!(service = %service_type, error = %err, "browse failed"),
            }
        }

        let until = tokio::time::Instant::now() + deadline;
        let mut events = futures::stream::select_all(streams);
        while let Ok(Some(event)) = tokio::time::timeout_at(until, events.next()).await {
            if let ServiceEvent::ServiceResolved(info) = event {
                for sighting in sightings(&info) {
                    sink(sighting);
                }
            }
        }

        for query in &browsed {
            if let Err(err) = daemon.stop_browse(query) {
                debug!(service = %query, error = %err, "failed to stop browse");
            }
        }
        if let Err(err) = daemon.shutdown() {
            debug!(error = %err, "failed to shut down mDNS daemon");
        }
    }
}

fn sightings(info: &ServiceInfo) -> Vec<ServiceSighting> {
    let service_type = strip_domain(info.get_type());
    let instance = instance_name(info.get_fullname(), info.get_type());
    let txt = info
        .get_properties()
        .iter()
        .next()
        .map(|property| format!("{}={}", property.key(), property.val_str()));

    info.get_addresses()
        .iter()
        .filter_map(|addr| match addr {
            IpAddr::V4(ip) => Some(*ip),
            IpAddr::V6(_) => None,
        })
        .map(|addr| ServiceSighting {
            addr,
            instance: instance.to_string(),
            service_type: service_type.to_string(),
            txt: txt.clone(),
        })
        .collect()
}

/// `_ipp._tcp.local.` -> `_ipp._tcp`
fn strip_domain(service_type: &str) -> &str {
    service_type
        .strip_suffix(LOCAL_DOMAIN)
        .unwrap_or(service_type)
        .trim_end_matches('.')
}

/// `Office Printer._ipp._tcp.local.` -> `Office Printer`
fn instance_name<'a>(fullname: &'a str, service_type: &str) -> &'a str {
    fullname
        .strip_suffix(service_type)
        .map_or(fullname, |name| name.trim_end_matches('.'))
}
