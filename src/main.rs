//! ISS tracker - headless position poller
//!
//! Polls the position endpoint on a timer and logs every rendered position.
//!
//! Module structure:
//! - `domain/` - Position readings, notifications
//! - `io/` - External interfaces (HTTP source, connectivity probe, Prometheus)
//! - `services/` - Refresh cycle, trigger scheduling, views
//! - `infra/` - Config, Metrics

use clap::Parser;
use iss_tracker::infra::{Config, Metrics};
use iss_tracker::io::{
    start_metrics_server, ConnectivityMonitor, HttpPositionSource, MetricsEndpoint,
};
use iss_tracker::services::{CycleOutcome, LogView, RefreshCycle, RenderSettings, Tracker, Trigger};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// ISS tracker - polls the current ISS position and logs it
#[derive(Parser, Debug)]
#[command(name = "iss-tracker", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Fetch once, print the result and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-cycle detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        version = %env!("CARGO_PKG_VERSION"),
        git_hash = %env!("GIT_HASH"),
        config_file = %config.config_file(),
        endpoint = %config.endpoint(),
        timeout_ms = ?config.request_timeout().map(|t| t.as_millis()),
        interval_secs = %config.poll_interval().as_secs(),
        timestamp_source = ?config.timestamp_source(),
        notify_style = ?config.notify_style(),
        "config_loaded"
    );

    let source = Arc::new(HttpPositionSource::from_config(&config)?);
    let metrics = Arc::new(Metrics::new());
    let cycle = Arc::new(RefreshCycle::new(
        source,
        Arc::new(LogView),
        metrics.clone(),
        RenderSettings::from_config(&config),
    ));

    if args.once {
        return match cycle.refresh(Trigger::Manual).await {
            CycleOutcome::Rendered(reading) => {
                println!("{} {}", reading.latitude, reading.longitude);
                Ok(())
            }
            CycleOutcome::Failed(kind) => Err(anyhow::anyhow!("refresh failed: {}", kind)),
            CycleOutcome::Stale => Ok(()),
        };
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (tracker, trigger) = Tracker::new(&config, cycle.clone());

    let tracker = if config.connectivity_enabled() {
        match ConnectivityMonitor::for_endpoint(
            config.endpoint(),
            config.probe_interval(),
            config.probe_timeout(),
        ) {
            Ok(monitor) => {
                let (conn_tx, conn_rx) = mpsc::channel(8);
                let conn_shutdown = shutdown_rx.clone();
                tokio::spawn(async move {
                    monitor.run(conn_tx, conn_shutdown).await;
                });
                tracker.with_connectivity(conn_rx)
            }
            Err(e) => {
                error!(error = %e, "connectivity_monitor_disabled");
                tracker
            }
        }
    } else {
        tracker
    };

    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let endpoint = MetricsEndpoint { cycle: cycle.clone(), trigger: Some(trigger.clone()) };
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(prometheus_port, endpoint, prom_shutdown).await {
                error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics.report().log();
        }
    });

    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    tracker.run(shutdown_rx).await;

    // Keep the handle alive until the tracker stops so /refresh stays usable
    drop(trigger);
    info!("iss-tracker shutdown complete");
    Ok(())
}
