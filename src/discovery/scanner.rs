//! Discovery orchestration.
//!
//! One cycle probes the whole subnet, applies the results to the registry,
//! runs the ARP and mDNS enrichers, then persists the snapshot. Cycles never
//! overlap.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::alerts::{AlertSender, DeviceAlert};
use super::device::Device;
use super::hostname::HostnameLookup;
use super::mdns::{self, ServiceBrowser};
use super::neighbors::{self, NeighborReport, NeighborSource};
use super::prober::{HostProbe, Prober};
use super::registry::{DeviceRegistry, Upsert};
use super::subnet::SubnetPrefix;
use crate::config::Config;
use crate::metrics::{DEVICES_KNOWN, DEVICES_ONLINE};

/// Whether the scanner is still on its first cycle since start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Devices found now already existed before startup; no alerts.
    Priming,
    Steady,
}

/// Knobs for the discovery loop.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub subnet: SubnetPrefix,
    pub interval: Duration,
    pub mdns_deadline: Duration,
    pub snapshot_path: PathBuf,
}

impl ScanSettings {
    /// Settings from configuration, auto-detecting the subnet when unset.
    pub fn from_config(config: &Config) -> Self {
        Self {
            subnet: config.subnet_prefix().unwrap_or_else(SubnetPrefix::detect),
            interval: config.scan.interval(),
            mdns_deadline: config.scan.mdns_deadline(),
            snapshot_path: config.devices_file.clone(),
        }
    }
}

/// Summary of one discovery cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub alive: usize,
    pub created: usize,
    pub alerted: usize,
    pub neighbors: NeighborReport,
    pub mdns_applied: usize,
    pub saved: bool,
}

/// Drives the discovery pipeline against a shared registry.
pub struct Scanner<L, N, B> {
    registry: Arc<DeviceRegistry>,
    prober: Prober,
    lookup: Arc<L>,
    neighbors: N,
    browser: B,
    alerts: AlertSender,
    settings: ScanSettings,
    phase: ScanPhase,
}

impl<L, N, B> Scanner<L, N, B>
where
    L: HostnameLookup,
    N: NeighborSource,
    B: ServiceBrowser,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        prober: Prober,
        lookup: L,
        neighbors: N,
        browser: B,
        alerts: AlertSender,
        settings: ScanSettings,
    ) -> Self {
        Self {
            registry,
            prober,
            lookup: Arc::new(lookup),
            neighbors,
            browser,
            alerts,
            settings,
            phase: ScanPhase::Priming,
        }
    }

    pub const fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub const fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Run one full cycle and move to the steady phase.
    #[instrument(skip(self), fields(subnet = %self.settings.subnet, phase = ?self.phase))]
    pub async fn run_cycle(&mut self) -> CycleReport {
        let applier = ProbeApplier {
            registry: Arc::clone(&self.registry),
            lookup: Arc::clone(&self.lookup),
            alerts: self.alerts.clone(),
            priming: self.phase == ScanPhase::Priming,
            tally: Arc::default(),
        };
        let tally = Arc::clone(&applier.tally);

        self.prober
            .sweep(self.settings.subnet.hosts(), move |probe| {
                let applier = applier.clone();
                async move { applier.apply(probe).await }
            })
            .await;

        let report = CycleReport {
            alive: tally.alive.load(Ordering::Relaxed),
            created: tally.created.load(Ordering::Relaxed),
            alerted: tally.alerted.load(Ordering::Relaxed),
            ..CycleReport::default()
        };
        self.finish_cycle(report).await
    }

    async fn finish_cycle(&mut self, mut report: CycleReport) -> CycleReport {
        report.neighbors = neighbors::run_pass(
            &self.registry,
            self.settings.subnet,
            &self.neighbors,
            Utc::now(),
        );
        report.mdns_applied =
            mdns::run_pass(&self.registry, &self.browser, self.settings.mdns_deadline).await;

        report.saved = match self.registry.save(&self.settings.snapshot_path).await {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %self.settings.snapshot_path.display(), error = %err, "failed to persist devices");
                false
            }
        };

        ::metrics::gauge!(DEVICES_KNOWN).set(self.registry.len() as f64);
        ::metrics::gauge!(DEVICES_ONLINE).set(self.registry.online_count() as f64);

        debug!(?report, "discovery cycle complete");
        self.phase = ScanPhase::Steady;
        report
    }

    /// Scan, then sleep the interval, until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            subnet = %self.settings.subnet,
            interval = ?self.settings.interval,
            workers = self.prober.workers(),
            "device discovery started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.run_cycle() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        info!("device discovery stopped");
    }
}

#[derive(Debug, Default)]
struct Tally {
    alive: AtomicUsize,
    created: AtomicUsize,
    alerted: AtomicUsize,
}

/// Per-cycle state shared by the probe workers.
struct ProbeApplier<L> {
    registry: Arc<DeviceRegistry>,
    lookup: Arc<L>,
    alerts: AlertSender,
    priming: bool,
    tally: Arc<Tally>,
}

impl<L> Clone for ProbeApplier<L> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            lookup: Arc::clone(&self.lookup),
            alerts: self.alerts.clone(),
            priming: self.priming,
            tally: Arc::clone(&self.tally),
        }
    }
}

impl<L: HostnameLookup> ProbeApplier<L> {
    async fn apply(&self, probe: HostProbe) {
        if !probe.is_alive() {
            self.registry.update(probe.ip, Device::mark_offline);
            return;
        }
        self.tally.alive.fetch_add(1, Ordering::Relaxed);

        let HostProbe { ip, services } = probe;
        // Each address is probed by exactly one worker, so the lookup cannot race
        // another insert for the same key.
        let hostname = if self.registry.contains(ip) {
            None
        } else {
            self.lookup.lookup(ip).await
        };

        let now = Utc::now();
        let outcome = self.registry.upsert_with(
            ip,
            || Device::new(ip, now).with_hostname(hostname),
            |device| device.mark_alive(services, now),
        );
        if outcome != Upsert::Created {
            return;
        }

        self.tally.created.fetch_add(1, Ordering::Relaxed);
        if self.priming {
            debug!(%ip, "known device at startup");
        } else {
            info!(%ip, "new device");
            if self.alerts.notify(DeviceAlert::NewDevice(ip)) {
                self.tally.alerted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
