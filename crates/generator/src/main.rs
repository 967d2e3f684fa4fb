//! Telemetry Generator - synthetic traces and metrics from a topology document
//!
//! Loads the topology, starts one generation task per root route and metric
//! series, and serves health, metrics and flag control over HTTP.

use anyhow::{Context, Result};
use generator_lib::{
    health::HealthRegistry,
    observability::{GeneratorMetrics, StructuredLogger},
    Engine, SchedulerBuilder, SharedClock, SystemClock,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use telemetry_generator::{api, config::GeneratorConfig};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting telemetry-generator");

    let config = GeneratorConfig::load()?;
    info!(
        topology = %config.topology_file.display(),
        sink = ?config.sink,
        "Generator configured"
    );

    let mut master = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let clock: SharedClock = Arc::new(SystemClock);
    let engine = Engine::from_path(&config.topology_file, clock, &mut master)
        .with_context(|| format!("Failed to load {}", config.topology_file.display()))?;
    let engine = Arc::new(engine);

    let health_registry = HealthRegistry::with_generator_components().await;
    let metrics = GeneratorMetrics::new();
    metrics.set_active_flags(engine.active_flag_count());

    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(
        GENERATOR_VERSION,
        engine.topology().services.len(),
        engine.root_routes().len(),
        engine.flags().len(),
    );

    let sink = config.build_sink().await?;
    let scheduler = SchedulerBuilder::new()
        .engine(Arc::clone(&engine))
        .sink(sink)
        .health(health_registry.clone())
        .metric_tick(config.metric_tick)
        .seed(master.gen())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let tasks = scheduler.start(&shutdown_tx).await;

    // Start health, metrics and flag server
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        Arc::clone(engine.flags()),
        logger.clone(),
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    for task in tasks {
        let _ = task.await;
    }
    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}
