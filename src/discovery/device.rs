//! Device records held by the registry.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::oui;

/// Placeholder device class meaning "no better information yet".
pub const UNKNOWN_DEVICE_TYPE: &str = "Unknown";

/// A host discovered on the local network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Registry key; never changes once the device exists.
    pub ip: Ipv4Addr,

    /// Reverse DNS name resolved when the device was first seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,

    /// Vendor derived from the MAC prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// Labels of the probed ports that accepted a connection in the latest cycle.
    #[serde(default, alias = "ports", skip_serializing_if = "Vec::is_empty")]
    pub open_services: Vec<String>,

    pub last_seen: DateTime<Utc>,

    #[serde(default)]
    pub is_online: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,

    /// First TXT record seen per mDNS service type.
    #[serde(default, alias = "mdns_info", skip_serializing_if = "BTreeMap::is_empty")]
    pub service_metadata: BTreeMap<String, String>,
}

impl Device {
    /// A device confirmed alive at `now`.
    pub fn new(ip: Ipv4Addr, now: DateTime<Utc>) -> Self {
        Self {
            ip,
            hostname: None,
            mac: None,
            manufacturer: None,
            open_services: Vec::new(),
            last_seen: now,
            is_online: true,
            friendly_name: None,
            device_type: None,
            service_metadata: BTreeMap::new(),
        }
    }

    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.hostname = hostname.filter(|name| !name.is_empty());
        self
    }

    /// Record a successful probe: online, seen now, services replaced.
    pub fn mark_alive(&mut self, services: Vec<String>, now: DateTime<Utc>) {
        self.open_services = services;
        self.last_seen = now;
        self.is_online = true;
    }

    pub fn mark_offline(&mut self) {
        self.is_online = false;
    }

    /// Set the MAC address and recompute the manufacturer from it.
    pub fn set_mac(&mut self, mac: impl Into<String>) {
        let mac = mac.into();
        self.manufacturer = oui::lookup(&mac).map(str::to_string);
        self.mac = Some(mac);
    }

    /// Apply `name` unless a more specific friendly name is already set.
    ///
    /// The hostname counts as a placeholder and can be replaced.
    pub fn upgrade_friendly_name(&mut self, name: &str) -> bool {
        let hostname = self.hostname.as_deref();
        upgrade(&mut self.friendly_name, name, |current| {
            Some(current) == hostname
        })
    }

    /// Apply `kind` unless a more specific device type is already set.
    pub fn upgrade_device_type(&mut self, kind: &str) -> bool {
        upgrade(&mut self.device_type, kind, |current| {
            current == UNKNOWN_DEVICE_TYPE
        })
    }

    pub fn record_service_metadata(&mut self, service_type: &str, text: impl Into<String>) {
        self.service_metadata
            .insert(service_type.to_string(), text.into());
    }
}

/// Upgrade-only assignment.
///
/// `slot` takes `candidate` only while it is empty or holds a value
/// `is_placeholder` accepts. Empty candidates are ignored. Returns whether the
/// slot changed.
pub fn upgrade(
    slot: &mut Option<String>,
    candidate: &str,
    is_placeholder: impl Fn(&str) -> bool,
) -> bool {
    if candidate.is_empty() {
        return false;
    }

    match slot.as_deref() {
        Some(current) if current == candidate => false,
        Some(current) if !current.is_empty() && !is_placeholder(current) => false,
        _ => {
            *slot = Some(candidate.to_string());
            true
        }
    }
}
