//! Homenet - Entry point.
//!
//! Runs device discovery and the DNS gatekeeper side by side until Ctrl-C,
//! logging a periodic status line and every new-device alert.
//!
//! `homenet wake <mac>` sends a Wake-on-LAN magic packet and exits.

use std::borrow::Cow;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use homenet::config::Config;
use homenet::discovery::{
    AlertStream, DeviceRegistry, MdnsBrowser, ProcNetArp, Prober, ScanSettings, Scanner,
    SystemLookup, WELL_KNOWN_SERVICES, alerts,
};
use homenet::dns::{Blocker, QueryStats, UpstreamResolver};
use homenet::server::{DnsServer, QueryHandler};

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "homenet=info";

/// How often the status line is logged.
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Arc::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

/// Bind and spawn the gatekeeper. Failures are logged and discovery carries on.
async fn start_gatekeeper(
    config: &Config,
    stats: Arc<QueryStats>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    let resolver =
        UpstreamResolver::from_config(config).context("Failed to create upstream resolver")?;
    info!(
        upstream = %resolver.describe(),
        blocklist = config.blocklist.len(),
        "starting DNS gatekeeper"
    );

    let handler = QueryHandler::new(resolver, Blocker::new(config.blocklist.iter().cloned()), stats);
    let server = DnsServer::bind(config.dns_listen, handler)
        .await
        .context("Failed to bind DNS port")?;

    Ok(tokio::spawn(async move {
        if let Err(err) = server.run(shutdown).await {
            error!("DNS gatekeeper error: {err:?}");
        }
    }))
}

/// Log alerts as they arrive and a status line every [`STATUS_INTERVAL`].
fn spawn_status_reporter(
    registry: Arc<DeviceRegistry>,
    stats: Arc<QueryStats>,
    mut alerts: AlertStream,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STATUS_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(alert) = alerts.recv() => warn!("{alert}"),
                _ = ticker.tick() => {
                    let queries = stats.snapshot();
                    info!(
                        devices = registry.len(),
                        online = registry.online_count(),
                        queries = queries.total,
                        blocked = queries.blocked,
                        "status"
                    );
                }
            }
        }
        for alert in alerts.drain() {
            warn!("{alert}");
        }
    })
}

async fn run(config: Config) -> Result<()> {
    homenet::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    let shutdown = CancellationToken::new();

    let registry = match DeviceRegistry::load(&config.devices_file).await {
        Ok(registry) => registry,
        Err(err) => {
            warn!(path = %config.devices_file.display(), error = %err, "starting with an empty device registry");
            DeviceRegistry::new()
        }
    };
    let registry = Arc::new(registry);
    info!(devices = registry.len(), "device registry loaded");

    let (alert_tx, alert_rx) = alerts::channel(config.scan.alert_capacity);
    let scanner = Scanner::new(
        Arc::clone(&registry),
        Prober::new(WELL_KNOWN_SERVICES, config.scan.probe_timeout(), config.scan.workers),
        SystemLookup,
        ProcNetArp::default(),
        MdnsBrowser::default(),
        alert_tx,
        ScanSettings::from_config(&config),
    );
    let scanner_handle = tokio::spawn(scanner.run(shutdown.clone()));

    let stats = Arc::new(QueryStats::new());
    let server_handle = match start_gatekeeper(&config, Arc::clone(&stats), shutdown.clone()).await {
        Ok(handle) => Some(handle),
        Err(err) => {
            error!("DNS gatekeeper not started: {err:#}");
            None
        }
    };

    let status_handle = spawn_status_reporter(
        Arc::clone(&registry),
        Arc::clone(&stats),
        alert_rx,
        shutdown.clone(),
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Ctrl-C received, shutting down...");
    shutdown.cancel();

    if let Err(err) = scanner_handle.await {
        error!("Discovery task failed: {err}");
    }
    if let Some(handle) = server_handle
        && let Err(err) = handle.await
    {
        error!("Gatekeeper task failed: {err}");
    }
    if let Err(err) = status_handle.await {
        error!("Status reporter failed: {err}");
    }

    if let Err(err) = registry.save(&config.devices_file).await {
        warn!(error = %err, "failed to save devices on shutdown");
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn wake(args: &[String]) -> Result<()> {
    let [mac] = args else {
        bail!("usage: homenet wake <mac>");
    };
    homenet::wol::wake(mac)
        .await
        .with_context(|| format!("Failed to wake {mac}"))?;
    info!(%mac, "magic packet sent");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Some((command, rest)) = args.split_first()
        && command == "wake"
    {
        init_tracing(None)?;
        return wake(rest).await;
    }

    let config_path = std::env::var("CONFIG_PATH")
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed("config.toml"));
    let config =
        Config::load_or_create(config_path.as_ref()).context("Failed to load configuration")?;

    init_tracing(config.log_file.as_deref())?;
    info!(config = %config_path, "Starting homenet...");

    run(config).await
}
