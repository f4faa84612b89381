//! Configuration loading and validation.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::SubnetPrefix;
use crate::error::{ConfigError, Result, ValidationError};

/// Main configuration for homenet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// First three octets of the LAN to scan (e.g. "192.168.1").
    /// Empty means auto-detect from the host's interfaces.
    #[serde(default)]
    pub subnet: String,

    /// Address the DNS gatekeeper listens on.
    #[serde(
        default = "default_dns_listen",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub dns_listen: SocketAddr,

    /// Upstream DNS resolver address used in `udp` mode (e.g. "1.1.1.1:53").
    #[serde(
        default = "default_upstream_resolver",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub upstream_resolver: SocketAddr,

    /// How unblocked queries are forwarded.
    #[serde(default)]
    pub resolver_mode: ResolverMode,

    /// DNS-over-HTTPS endpoint used in `doh` mode.
    #[serde(default = "default_doh_url")]
    pub doh_url: String,

    /// Fully-qualified domains (with trailing dot) answered with NXDOMAIN.
    /// Matching is exact: no wildcards, no subdomains.
    #[serde(default = "default_blocklist")]
    pub blocklist: Vec<String>,

    /// Where the device registry snapshot is persisted.
    #[serde(default = "default_devices_file")]
    pub devices_file: PathBuf,

    /// Append logs to this file instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Discovery pipeline tuning.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Prometheus metrics exporter.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Upstream forwarding mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverMode {
    /// Classic DNS exchange over UDP.
    #[default]
    Udp,
    /// DNS-over-HTTPS (RFC 8484 POST).
    Doh,
}

/// Discovery pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    /// Pause between the end of one scan cycle and the start of the next.
    #[serde(default = "default_scan_interval")]
    pub interval_secs: u64,

    /// Per-port TCP connect timeout.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Number of concurrent probe workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Deadline for the whole mDNS enrichment pass.
    #[serde(default = "default_mdns_timeout")]
    pub mdns_timeout_secs: u64,

    /// Capacity of the new-device alert queue. Alerts are dropped when full.
    #[serde(default = "default_alert_capacity")]
    pub alert_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_scan_interval(),
            probe_timeout_ms: default_probe_timeout(),
            workers: default_workers(),
            mdns_timeout_secs: default_mdns_timeout(),
            alert_capacity: default_alert_capacity(),
        }
    }
}

impl ScanConfig {
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub const fn mdns_deadline(&self) -> Duration {
        Duration::from_secs(self.mdns_timeout_secs)
    }
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(
        default = "default_metrics_listen",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

const fn default_dns_listen() -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED), 53)
}

const fn default_upstream_resolver() -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), 53)
}

const fn default_metrics_listen() -> SocketAddr {
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 9090)
}

fn default_doh_url() -> String {
    "https://cloudflare-dns.com/dns-query".to_string()
}

fn default_devices_file() -> PathBuf {
    PathBuf::from("devices.json")
}

fn default_blocklist() -> Vec<String> {
    [
        "ads.google.com.",
        "doubleclick.net.",
        "analytics.google.com.",
        "google-analytics.com.",
        "googlesyndication.com.",
        "adservice.google.com.",
        "facebook.com.",
        "graph.facebook.com.",
        "creative.ak.fbcdn.net.",
        "pixel.facebook.com.",
        "ad.doubleclick.net.",
        "pagead2.googlesyndication.com.",
        "tpc.googlesyndication.com.",
        "www.googleadservices.com.",
        "partner.googleadservices.com.",
        "telemetry.microsoft.com.",
        "vortex.data.microsoft.com.",
        "settings-win.data.microsoft.com.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

const fn default_scan_interval() -> u64 {
    5
}

const fn default_probe_timeout() -> u64 {
    200
}

const fn default_workers() -> usize {
    50
}

const fn default_mdns_timeout() -> u64 {
    5
}

const fn default_alert_capacity() -> usize {
    10
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subnet: String::new(),
            dns_listen: default_dns_listen(),
            upstream_resolver: default_upstream_resolver(),
            resolver_mode: ResolverMode::default(),
            doh_url: default_doh_url(),
            blocklist: default_blocklist(),
            devices_file: default_devices_file(),
            log_file: None,
            scan: ScanConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Load configuration, writing the defaults to `path` first if the file does not exist.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
            Err(err) => Err(ConfigError::ReadFile(err).into()),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(ConfigError::WriteFile)?;
        Ok(())
    }

    /// The configured subnet prefix, or `None` when it should be auto-detected.
    pub fn subnet_prefix(&self) -> Option<SubnetPrefix> {
        let subnet = self.subnet.trim();
        if subnet.is_empty() {
            return None;
        }
        subnet.parse().ok()
    }

    /// Validate the configuration.
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.scan.interval_secs == 0 {
            return Err(ValidationError::ZeroScanInterval.into());
        }

        if self.scan.probe_timeout_ms == 0 {
            return Err(ValidationError::ZeroProbeTimeout.into());
        }

        if self.scan.workers == 0 {
            return Err(ValidationError::ZeroWorkers.into());
        }

        if self.scan.mdns_timeout_secs == 0 {
            return Err(ValidationError::ZeroMdnsTimeout.into());
        }

        if self.scan.alert_capacity == 0 {
            return Err(ValidationError::ZeroAlertCapacity.into());
        }

        let subnet = self.subnet.trim();
        if !subnet.is_empty() && subnet.parse::<SubnetPrefix>().is_err() {
            return Err(ValidationError::InvalidSubnet {
                value: self.subnet.clone(),
            }
            .into());
        }

        if self.resolver_mode == ResolverMode::Doh
            && !(self.doh_url.starts_with("https://") || self.doh_url.starts_with("http://"))
        {
            return Err(ValidationError::InvalidDohUrl {
                url: self.doh_url.clone(),
            }
            .into());
        }

        for entry in &self.blocklist {
            if entry.is_empty() {
                return Err(ValidationError::EmptyBlocklistEntry.into());
            }
            if !entry.ends_with('.') {
                return Err(ValidationError::UnqualifiedBlocklistEntry {
                    entry: entry.clone(),
                }
                .into());
            }
        }

        Ok(())
    }
}
