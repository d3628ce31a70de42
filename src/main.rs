// src/main.rs

use anyhow::Result;
use feed_tracker::pipeline::{HttpReportSource, LoggingSink, PollScheduler};
use feed_tracker::{Config, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🛰️ Feed tracker starting ({:?} profile)", config.profile);
    info!(
        "Guard thresholds: noise={:.0}m, jump={:.0}m, max_speed={:.0}km/h, confirm={:.0}m, ttl={:.0}s",
        config.guard.noise_meters,
        config.guard.jump_meters,
        config.guard.max_plausible_speed_kmh,
        config.guard.confirm_radius_meters,
        config.guard.quarantine_ttl_secs
    );

    let source = HttpReportSource::new(
        config.source.url.clone(),
        Duration::from_millis(config.poll.fetch_timeout_ms),
    )?;
    info!("📡 Feed URL: {}", source.url());

    let mut scheduler = PollScheduler::new(
        config,
        Arc::new(source),
        Box::new(LoggingSink::default()),
        Arc::new(SystemClock),
    );
    scheduler.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
    }

    info!("Shutting down...");
    scheduler.stop().await;

    let summary = scheduler.metrics().summary();
    info!("Cycles: {} ({} failed fetches)", summary.cycles, summary.failed_fetches);
    info!(
        "Entities: {} spawned, {} retired, {} still tracked",
        summary.spawned, summary.retired, summary.tracked
    );
    info!(
        "Guard: {} quarantines, {} confirmed, {} expired",
        summary.quarantines, summary.confirmations, summary.expiries
    );
    println!("{}", serde_json::to_string(&summary)?);

    Ok(())
}
