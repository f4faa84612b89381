//! Metrics initialization for Prometheus exporter.

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::error::Result;

/// Total DNS questions seen by the gatekeeper.
pub const DNS_QUERIES_TOTAL: &str = "homenet_dns_queries_total";
/// DNS questions answered with NXDOMAIN because of the blocklist.
pub const DNS_BLOCKED_TOTAL: &str = "homenet_dns_blocked_total";
/// Forwarded queries that failed upstream.
pub const DNS_UPSTREAM_ERRORS_TOTAL: &str = "homenet_dns_upstream_errors_total";
/// Devices held in the registry.
pub const DEVICES_KNOWN: &str = "homenet_devices_known";
/// Devices found alive in the latest scan cycle.
pub const DEVICES_ONLINE: &str = "homenet_devices_online";

/// Initialize the metrics system based on configuration.
///
/// When metrics are enabled, this starts an HTTP server that exposes
/// a `/metrics` endpoint for Prometheus to scrape.
///
/// When metrics are disabled, this is a no-op. The `metrics` crate
/// handles unregistered metrics gracefully (they become no-ops).
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(|err| crate::error::Error::Metrics(err.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_skip_exporter_when_disabled() {
        assert!(init(&MetricsConfig::default()).is_ok());
    }

    #[test]
    fn should_prefix_every_metric_name() {
        for name in [
            DNS_QUERIES_TOTAL,
            DNS_BLOCKED_TOTAL,
            DNS_UPSTREAM_ERRORS_TOTAL,
            DEVICES_KNOWN,
            DEVICES_ONLINE,
        ] {
            assert!(name.starts_with("homenet_"), "{name}");
        }
    }
}
