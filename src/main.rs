// =============================================================================
// Alpha Engine — Main Entry Point
// =============================================================================
//
// One invocation = one pipeline run over the configured store, followed by a
// health check.  With ALPHA_SERVE set the process then stays up and serves
// the REST API (which can trigger further runs) until Ctrl+C.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use alpha_engine::api;
use alpha_engine::app_state::AppState;
use alpha_engine::health::run_health_check;
use alpha_engine::runtime_config::EngineConfig;
use alpha_engine::simulation::rng_from_seed;
use alpha_engine::store::FileStore;
use alpha_engine::synthetic::SyntheticCollector;

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Alpha Engine — Starting Up                        ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path = std::env::var("ALPHA_CONFIG").unwrap_or_else(|_| "engine_config.json".into());
    let mut config = EngineConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });
    config.apply_env_overrides();

    let names: Vec<&str> = config.entities.iter().map(|e| e.name.as_str()).collect();
    info!(
        entities = ?names,
        horizon_days = config.horizon_days,
        iterations = config.monte_carlo_iterations,
        seed = ?config.seed,
        parallel = config.parallel,
        "Configured entities"
    );

    // ── 2. Store ─────────────────────────────────────────────────────────
    let store_dir = std::env::var("ALPHA_STORE_DIR").unwrap_or_else(|_| "data/store".into());
    let store = Arc::new(
        FileStore::open(&store_dir).with_context(|| format!("failed to open store at {store_dir}"))?,
    );
    info!(dir = %store_dir, "File store ready");

    // ── 3. Optional synthetic feeds ──────────────────────────────────────
    if env_flag("ALPHA_SYNTHETIC") {
        let mut collector = SyntheticCollector::new(
            rng_from_seed(config.seed),
            config.lookback_days,
            config.job_months,
        );
        collector
            .collect(store.as_ref(), &config.entities)
            .context("synthetic collection failed")?;
    }

    // ── 4. Shared state + initial run ────────────────────────────────────
    let admin_token = std::env::var("ALPHA_ADMIN_TOKEN").ok();
    let staleness_hours = config.staleness_hours;
    let state = Arc::new(AppState::new(config, store.clone(), admin_token));

    match state.run_pipeline().await {
        Ok(report) => info!(
            run_id = %report.metadata.run_id,
            opportunities = report.ranked.opportunities.len(),
            "Initial run complete"
        ),
        Err(e) => error!(error = %e, "Initial run failed"),
    }

    if let Err(e) = run_health_check(store.as_ref(), staleness_hours) {
        error!(error = %e, "Failed to write health status");
    }

    if !env_flag("ALPHA_SERVE") {
        info!("Alpha Engine run complete.");
        return Ok(());
    }

    // ── 5. API server ────────────────────────────────────────────────────
    if state.admin_token.is_none() {
        warn!("ALPHA_ADMIN_TOKEN is not set — authenticated endpoints will reject every request");
    }

    let bind_addr = std::env::var("ALPHA_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening. Press Ctrl+C to stop.");

    axum::serve(listener, api::rest::router(state.clone()))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Shutdown signal received — stopping gracefully");
        })
        .await
        .context("API server failed")?;

    info!("Alpha Engine shut down complete.");
    Ok(())
}
