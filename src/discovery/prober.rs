//! Active TCP probing of the scanned subnet.
//!
//! Hosts are pushed through a bounded queue to a fixed pool of workers, so the
//! number of sockets in flight never exceeds the worker count. Each worker
//! probes one host at a time, port by port.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default per-connection timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Default number of concurrent probe workers.
pub const DEFAULT_WORKERS: usize = 50;

/// A probed TCP port and the label reported when it accepts a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePort {
    pub port: u16,
    pub label: &'static str,
}

impl ServicePort {
    pub const fn new(port: u16, label: &'static str) -> Self {
        Self { port, label }
    }
}

/// Ports commonly open on home devices.
pub const WELL_KNOWN_SERVICES: &[ServicePort] = &[
    ServicePort::new(22, "SSH"),
    ServicePort::new(53, "DNS"),
    ServicePort::new(80, "HTTP"),
    ServicePort::new(443, "HTTPS"),
    ServicePort::new(3389, "RDP"),
    ServicePort::new(5000, "UPnP"),
    ServicePort::new(5353, "mDNS"),
    ServicePort::new(8000, "HTTP-ALT"),
    ServicePort::new(8080, "HTTP-ALT"),
    ServicePort::new(62078, "iOS-Sync"),
];

/// Result of probing one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProbe {
    pub ip: Ipv4Addr,
    /// Labels of the ports that accepted, in probe order.
    pub services: Vec<String>,
}

impl HostProbe {
    /// A host is alive iff at least one port accepted.
    pub fn is_alive(&self) -> bool {
        !self.services.is_empty()
    }
}

/// Bounded-concurrency TCP connect prober.
#[derive(Debug, Clone)]
pub struct Prober {
    ports: Arc<[ServicePort]>,
    timeout: Duration,
    workers: usize,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new(WELL_KNOWN_SERVICES, DEFAULT_PROBE_TIMEOUT, DEFAULT_WORKERS)
    }
}

impl Prober {
    pub fn new(ports: &[ServicePort], timeout: Duration, workers: usize) -> Self {
        Self {
            ports: Arc::from(ports),
            timeout,
            workers: workers.max(1),
        }
    }

    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Try every configured port on `ip`.
    ///
    /// Refused or timed-out connections are expected and simply leave the
    /// port out of the result.
    pub async fn probe_host(&self, ip: Ipv4Addr) -> HostProbe {
        let mut services: Vec<String> = Vec::new();

        for service in self.ports.iter() {
            let addr = SocketAddr::new(IpAddr::V4(ip), service.port);
            if let Ok(Ok(_stream)) = tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await
                && !services.iter().any(|label| label == service.label)
            {
                services.push(service.label.to_string());
            }
        }

        HostProbe { ip, services }
    }

    /// Probe every host and hand each result to `on_result` from the worker
    /// that produced it.
    ///
    /// Returns once every host has been probed and every `on_result` future
    /// has completed.
    pub async fn sweep<I, F, Fut>(&self, hosts: I, on_result: F)
    where
        I: IntoIterator<Item = Ipv4Addr>,
        F: Fn(HostProbe) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (queue, jobs) = flume::bounded::<Ipv4Addr>(self.workers);
        let on_result = Arc::new(on_result);
        let mut workers = JoinSet::new();

        for _ in 0..self.workers {
            let jobs = jobs.clone();
            let prober = self.clone();
            let on_result = Arc::clone(&on_result);
            workers.spawn(async move {
                while let Ok(ip) = jobs.recv_async().await {
                    let probe = prober.probe_host(ip).await;
                    on_result(probe).await;
                }
            });
        }
        drop(jobs);

        for ip in hosts {
            if queue.send_async(ip).await.is_err() {
                warn!("probe workers exited early");
                break;
            }
        }
        drop(queue);

        while let Some(result) = workers.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "probe worker failed");
            }
        }
    }

    /// Probe every host and collect the results, ordered by IP.
    pub async fn scan<I>(&self, hosts: I) -> Vec<HostProbe>
    where
        I: IntoIterator<Item = Ipv4Addr>,
    {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        self.sweep(hosts, move |probe| {
            let sink = Arc::clone(&sink);
            async move { sink.lock().push(probe) }
        })
        .await;

        let mut results = std::mem::take(&mut *results.lock());
        results.sort_by_key(|probe| probe.ip);
        debug!(
            hosts = results.len(),
            alive = results.iter().filter(|probe| probe.is_alive()).count(),
            "scan complete"
        );
        results
    }
}
