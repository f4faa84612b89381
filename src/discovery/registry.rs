//! Concurrency-safe device registry with atomic snapshot persistence.
//!
//! The whole map sits behind one read/write lock: readers (snapshots, the
//! presentation layer) run concurrently, writers (probe appliers, the ARP and
//! mDNS passes) are exclusive. Devices are never removed.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tokio::fs;
use tracing::debug;

use super::device::Device;
use crate::error::Result;

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// Mapping from IP address to [`Device`].
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<Ipv4Addr, Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.devices.read().contains_key(&ip)
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<Device> {
        self.devices.read().get(&ip).cloned()
    }

    /// Return the device at `ip`, inserting the one built by `create` if absent.
    pub fn get_or_create(&self, ip: Ipv4Addr, create: impl FnOnce() -> Device) -> Device {
        let mut devices = self.devices.write();
        devices.entry(ip).or_insert_with(|| keyed(ip, create())).clone()
    }

    /// Insert the device built by `create` if absent, then apply `update`.
    ///
    /// Both steps happen under a single write lock.
    pub fn upsert_with(
        &self,
        ip: Ipv4Addr,
        create: impl FnOnce() -> Device,
        update: impl FnOnce(&mut Device),
    ) -> Upsert {
        let mut devices = self.devices.write();
        let mut outcome = Upsert::Updated;
        let device = devices.entry(ip).or_insert_with(|| {
            outcome = Upsert::Created;
            keyed(ip, create())
        });
        update(device);
        outcome
    }

    /// Apply `update` to an existing device. Returns `false` if `ip` is unknown.
    pub fn update(&self, ip: Ipv4Addr, update: impl FnOnce(&mut Device)) -> bool {
        match self.devices.write().get_mut(&ip) {
            Some(device) => {
                update(device);
                true
            }
            None => false,
        }
    }

    /// Independent copy of every device, ordered by IP.
    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.devices
            .read()
            .values()
            .filter(|device| device.is_online)
            .count()
    }

    /// Load a registry from a JSON snapshot.
    ///
    /// A missing file yields an empty registry. Every loaded device starts
    /// offline until a scan confirms it again.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no device snapshot yet");
                return Ok(Self::new());
            }
            Err(err) => return Err(err.into()),
        };

        let mut devices: BTreeMap<Ipv4Addr, Device> = serde_json::from_slice(&content)?;
        for (ip, device) in &mut devices {
            device.ip = *ip;
            device.is_online = false;
        }

        Ok(Self {
            devices: RwLock::new(devices),
        })
    }

    /// Persist the registry as JSON, replacing `path` atomically.
    ///
    /// The snapshot is written to `<path>.tmp` and renamed into place, so
    /// readers see either the previous or the new file, never a partial one.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = {
            let devices = self.devices.read();
            serde_json::to_vec_pretty(&*devices)?
        };

        let tmp = temp_path(path);
        fs::write(&tmp, &content).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn keyed(ip: Ipv4Addr, mut device: Device) -> Device {
    device.ip = ip;
    device
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
