//! Error types for homenet.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for homenet operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("DNS protocol error: {0}")]
    Protocol(#[from] hickory_proto::ProtoError),

    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("resolver error: {0}")]
    Resolver(String),

    #[error("device snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to write default config file: {0}")]
    WriteFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] toml::ser::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("scan.interval_secs must be greater than 0")]
    ZeroScanInterval,

    #[error("scan.probe_timeout_ms must be greater than 0")]
    ZeroProbeTimeout,

    #[error("scan.workers must be greater than 0")]
    ZeroWorkers,

    #[error("scan.mdns_timeout_secs must be greater than 0")]
    ZeroMdnsTimeout,

    #[error("scan.alert_capacity must be greater than 0")]
    ZeroAlertCapacity,

    #[error("invalid subnet prefix (expected three octets such as \"192.168.1\"): {value:?}")]
    InvalidSubnet { value: String },

    #[error("blocklist entry cannot be empty")]
    EmptyBlocklistEntry,

    #[error("blocklist entry must be fully qualified (end with '.'): {entry:?}")]
    UnqualifiedBlocklistEntry { entry: String },

    #[error("doh_url must start with http:// or https://: {url:?}")]
    InvalidDohUrl { url: String },
}

/// Network-related errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("no suitable network interface found")]
    NoInterface,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("invalid MAC address: {input:?}")]
    InvalidMac { input: String },

    #[error("failed to send packet: {0}")]
    SendFailed(String),
}

/// Failures talking to the upstream resolver.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("timeout waiting for {upstream}")]
    Timeout { upstream: String },

    #[error("DoH endpoint returned status {status}")]
    HttpStatus { status: u16 },

    #[error("DoH request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("malformed DNS message from upstream: {0}")]
    MalformedBody(#[source] hickory_proto::ProtoError),

    #[error("failed to create HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
