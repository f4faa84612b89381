//! Integration tests for the discovery pipeline.
//!
//! Probing runs against loopback listeners; the neighbor table, reverse DNS
//! and mDNS are replaced with in-memory sources.

use std::collections::HashMap;
use std::io;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use homenet::discovery::{
    AlertStream, DeviceAlert, DeviceRegistry, HostnameLookup, Neighbor, NeighborSource, Prober,
    ScanPhase, ScanSettings, Scanner, ServiceBrowser, ServicePort, ServiceSighting, SubnetPrefix,
    alerts,
};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Names(HashMap<Ipv4Addr, String>);

impl HostnameLookup for Names {
    async fn lookup(&self, ip: Ipv4Addr) -> Option<String> {
        self.0.get(&ip).cloned()
    }
}

#[derive(Default)]
struct Neighbors(Vec<Neighbor>);

impl NeighborSource for Neighbors {
    fn neighbors(&self) -> io::Result<Vec<Neighbor>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct Sightings(Vec<ServiceSighting>);

impl ServiceBrowser for Sightings {
    async fn browse(&self, _deadline: Duration, sink: &(dyn Fn(ServiceSighting) + Send + Sync)) {
        for sighting in &self.0 {
            sink(sighting.clone());
        }
    }
}

type TestScanner = Scanner<Names, Neighbors, Sightings>;

/// Scanner wiring with in-memory enrichment sources.
struct Setup {
    subnet: SubnetPrefix,
    prober: Prober,
    alert_capacity: usize,
    names: Names,
    neighbors: Neighbors,
    sightings: Sightings,
}

impl Setup {
    fn new(subnet: SubnetPrefix, prober: Prober) -> Self {
        Self {
            subnet,
            prober,
            alert_capacity: 10,
            names: Names::default(),
            neighbors: Neighbors::default(),
            sightings: Sightings::default(),
        }
    }

    fn build(self, snapshot: &Path) -> (TestScanner, Arc<DeviceRegistry>, AlertStream) {
        let registry = Arc::new(DeviceRegistry::new());
        let (sender, stream) = alerts::channel(self.alert_capacity);
        let settings = ScanSettings {
            subnet: self.subnet,
            interval: Duration::from_millis(50),
            mdns_deadline: Duration::from_millis(50),
            snapshot_path: snapshot.to_path_buf(),
        };
        let scanner = Scanner::new(
            Arc::clone(&registry),
            self.prober,
            self.names,
            self.neighbors,
            self.sightings,
            sender,
            settings,
        );
        (scanner, registry, stream)
    }
}

fn prober(port: u16, workers: usize) -> Prober {
    Prober::new(&[ServicePort::new(port, "TEST")], Duration::from_millis(100), workers)
}

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Listen on `port` (any free port when 0) at `127.0.0.<host>` for every
/// host given. Returns the port shared by all listeners.
#[cfg(target_os = "linux")]
async fn listen_on_port(port: u16, hosts: &[u8]) -> (u16, Vec<TcpListener>) {
    let mut port = port;
    let mut listeners = Vec::with_capacity(hosts.len());
    for &host in hosts {
        let listener = TcpListener::bind((Ipv4Addr::new(127, 0, 0, host), port))
            .await
            .unwrap();
        port = listener.local_addr().unwrap().port();
        listeners.push(listener);
    }
    (port, listeners)
}

#[cfg(target_os = "linux")]
async fn listen_on(hosts: &[u8]) -> (u16, Vec<TcpListener>) {
    listen_on_port(0, hosts).await
}

#[cfg(target_os = "linux")]
fn online(registry: &DeviceRegistry) -> Vec<Ipv4Addr> {
    registry
        .snapshot()
        .into_iter()
        .filter(|device| device.is_online)
        .map(|device| device.ip)
        .collect()
}

const LOOPBACK: SubnetPrefix = SubnetPrefix::new(127, 0, 0);

#[tokio::test]
async fn should_discover_device_from_neighbor_table_alone() {
    let dir = TempDir::new().unwrap();
    let mut setup = Setup::new(
        SubnetPrefix::new(10, 0, 0),
        Prober::new(&[], Duration::from_millis(100), 8),
    );
    setup.neighbors = Neighbors(vec![Neighbor {
        ip: Ipv4Addr::new(10, 0, 0, 5),
        mac: "aa:bb:cc:dd:ee:ff".into(),
    }]);
    let (mut scanner, registry, mut alerts) = setup.build(&dir.path().join("devices.json"));

    let report = scanner.run_cycle().await;

    assert_eq!(report.alive, 0);
    assert_eq!(report.neighbors.discovered, 1);
    let devices = registry.snapshot();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].ip, Ipv4Addr::new(10, 0, 0, 5));
    assert!(devices[0].is_online);
    assert_eq!(devices[0].mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    assert_eq!(devices[0].manufacturer, None);
    assert!(alerts.drain().is_empty());
}

#[tokio::test]
async fn should_not_alert_while_priming_and_flip_offline_later() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("devices.json");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let names = Names(HashMap::from([(Ipv4Addr::LOCALHOST, "router.lan".to_string())]));
    let sightings = Sightings(vec![
        ServiceSighting {
            addr: Ipv4Addr::LOCALHOST,
            instance: "Router@gateway".into(),
            service_type: "_http._tcp".into(),
            txt: Some("path=/admin".into()),
        },
        ServiceSighting {
            addr: Ipv4Addr::new(127, 0, 0, 77),
            instance: "Ghost".into(),
            service_type: "_hap._tcp".into(),
            txt: None,
        },
    ]);
    let mut setup = Setup::new(LOOPBACK, prober(port, 64));
    setup.names = names;
    setup.sightings = sightings;
    let (mut scanner, registry, mut alerts) = setup.build(&snapshot);

    let first = scanner.run_cycle().await;

    assert_eq!(scanner.phase(), ScanPhase::Steady);
    assert_eq!((first.alive, first.created, first.alerted), (1, 1, 0));
    assert_eq!(first.mdns_applied, 1);
    assert!(first.saved);
    assert!(alerts.drain().is_empty());
    let device = registry.get(Ipv4Addr::LOCALHOST).unwrap();
    assert!(device.is_online);
    assert_eq!(device.hostname.as_deref(), Some("router.lan"));
    assert_eq!(device.open_services, vec!["TEST".to_string()]);
    assert_eq!(device.friendly_name.as_deref(), Some("Router"));
    assert_eq!(device.device_type.as_deref(), Some("Web Server"));
    assert!(!registry.contains(Ipv4Addr::new(127, 0, 0, 77)));

    drop(listener);
    let second = scanner.run_cycle().await;

    assert_eq!(second.alive, 0);
    let device = registry.get(Ipv4Addr::LOCALHOST).unwrap();
    assert!(!device.is_online);
    assert_eq!(device.friendly_name.as_deref(), Some("Router"));
    assert_eq!(registry.len(), 1);

    let reloaded = DeviceRegistry::load(&snapshot).await.unwrap();
    assert_eq!(reloaded.snapshot(), registry.snapshot());
}

#[tokio::test]
async fn should_alert_for_devices_appearing_after_priming() {
    let dir = TempDir::new().unwrap();
    let port = free_port().await;
    let (mut scanner, registry, mut alerts) =
        Setup::new(LOOPBACK, prober(port, 64)).build(&dir.path().join("devices.json"));

    let first = scanner.run_cycle().await;
    assert_eq!(first.alive, 0);
    assert!(registry.is_empty());

    let _listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let second = scanner.run_cycle().await;

    assert_eq!((second.alive, second.created, second.alerted), (1, 1, 1));
    assert_eq!(
        alerts.recv().await,
        Some(DeviceAlert::NewDevice(Ipv4Addr::LOCALHOST))
    );
    assert_eq!(
        alerts.drain().len(),
        0,
        "a known device must not alert twice"
    );

    let third = scanner.run_cycle().await;
    assert_eq!((third.alive, third.created, third.alerted), (1, 0, 0));
}

// Addresses other than 127.0.0.1 are only routed to loopback on Linux.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn should_mark_exactly_the_reachable_hosts_online() {
    let dir = TempDir::new().unwrap();
    let reachable = [1, 2, 3, 17, 100, 200, 254];
    let (port, _listeners) = listen_on(&reachable).await;
    let (mut scanner, registry, _alerts) =
        Setup::new(LOOPBACK, prober(port, 8)).build(&dir.path().join("devices.json"));

    let report = scanner.run_cycle().await;

    let expected: Vec<Ipv4Addr> = reachable
        .iter()
        .map(|&host| Ipv4Addr::new(127, 0, 0, host))
        .collect();
    assert_eq!(report.alive, reachable.len());
    assert_eq!(report.created, reachable.len());
    assert_eq!(online(&registry), expected);
    assert_eq!(registry.len(), reachable.len());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn should_drop_alerts_beyond_queue_capacity() {
    let dir = TempDir::new().unwrap();
    let reachable = [10, 20, 30, 40, 50];
    let port = free_port().await;
    let mut setup = Setup::new(LOOPBACK, prober(port, 8));
    setup.alert_capacity = 2;
    let (mut scanner, registry, mut alerts) = setup.build(&dir.path().join("devices.json"));

    let priming = scanner.run_cycle().await;
    assert_eq!(priming.alive, 0);

    let (_, _listeners) = listen_on_port(port, &reachable).await;
    let steady = scanner.run_cycle().await;

    assert_eq!(steady.created, reachable.len());
    assert_eq!(steady.alerted, 2);
    assert_eq!(alerts.drain().len(), 2);
    assert_eq!(online(&registry).len(), reachable.len());
}

#[tokio::test]
async fn should_keep_running_when_snapshot_cannot_be_written() {
    let dir = TempDir::new().unwrap();
    let port = free_port().await;
    let (mut scanner, _registry, _alerts) = Setup::new(LOOPBACK, prober(port, 64))
        .build(&dir.path().join("missing").join("devices.json"));

    let report = scanner.run_cycle().await;

    assert!(!report.saved);
    assert_eq!(scanner.phase(), ScanPhase::Steady);
}

#[tokio::test]
async fn should_stop_loop_on_cancellation() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("devices.json");
    let port = free_port().await;
    let (scanner, _registry, _alerts) = Setup::new(LOOPBACK, prober(port, 64)).build(&snapshot);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(scanner.run(shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(10), async {
        while !snapshot.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("first cycle never persisted");
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("scanner did not stop")
        .unwrap();
}
