//! Skymesh constellation simulator daemon.
//!
//! - Loads the transceiver catalog and scenario
//! - Advances simulated time on a tick interval (real-time or accelerated)
//! - Rebuilds and evaluates wireless connectivity each tick
//! - Runs one southbound agent per network node with scheduled actions and
//!   telemetry
//! - Serves Prometheus metrics when `--metrics-addr` is set

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use skymesh_sim::{metrics, Cli, SimRuntime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let config = cli.resolve().map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(
        tick_ms = config.tick_interval.as_millis() as u64,
        accelerated = config.accelerated,
        "skymesh-sim starting"
    );

    let runtime = Arc::new(SimRuntime::build(config.clone(), Utc::now())?);
    runtime.start_agents();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Task 1: metrics endpoint ────────────────────────────────
    if let Some(addr) = config.metrics_addr {
        let metrics_runtime = runtime.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::run(metrics_runtime, addr).await {
                tracing::error!("metrics server failed: {e}");
            }
        });
    }

    // ── Task 2: simulation loop ─────────────────────────────────
    let loop_runtime = runtime.clone();
    let mut loop_handle = tokio::spawn(async move {
        loop_runtime.run(shutdown_rx).await;
    });

    // ── Shutdown handling ───────────────────────────────────────
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down after current tick");
            let _ = shutdown_tx.send(true);
            let _ = (&mut loop_handle).await;
        }
        result = &mut loop_handle => {
            if let Err(e) = result {
                tracing::error!("simulation loop task failed: {e}");
            }
        }
    }

    tracing::info!("skymesh-sim stopped");
    Ok(())
}
