use std::sync::Arc;

use tracing::{info, warn};

use slotbook::compactor;
use slotbook::{Config, ReservationEngine, SystemClock};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("SLOTBOOK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    slotbook::observability::init(metrics_port)?;

    // An invalid interval or hold window is fatal at startup.
    let config = Config::from_env()?;
    let engine = ReservationEngine::open(&config, Arc::new(SystemClock))?;
    let policy = engine.policy();

    info!("slotbook started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  interval: {}ms", policy.interval_ms);
    info!("  hold_window: {}ms", policy.hold_window_ms);
    info!("  lead_time: {}ms", config.lead_time_ms);
    let metrics_addr = metrics_port
        .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"));
    info!("  metrics: {metrics_addr}");

    let compactor = tokio::spawn(compactor::run_compactor(
        engine.store().clone(),
        config.compact_threshold,
    ));

    shutdown_signal().await?;
    info!("shutdown signal received");
    compactor.abort();

    match compactor::compact_if_needed(engine.store(), config.compact_threshold).await {
        Ok(true) => info!("final compaction done"),
        Ok(false) => {}
        Err(e) => warn!("final compaction failed: {e}"),
    }

    info!("slotbook stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = ctrl_c => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    Ok(())
}
