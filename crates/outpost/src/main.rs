//! # Outpost - Questline Mission Service
//!
//! Serves missions whose completion is proven with a combined
//! `STATIC-TOTP` code copied from a partner page, and credits the reward.
//!
//! ## Architecture
//! ```text
//! Partner page ── GET /missions/{id}/totp ──┐
//!                                           ├─ Outpost ─ Redis (missions, codes, credits)
//! Visitor ──── POST /missions/{id}/verify ──┘
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod clients;
mod config;
mod credits;
mod missions;
mod routes;
mod state;

use config::AppConfig;
use state::AppState;

/// Questline Outpost - mission codes and credit rewards
#[derive(Parser, Debug)]
#[command(name = "outpost")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/outpost.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Admin API token (overrides config)
    #[arg(long, env = "OUTPOST_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Questline Outpost v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!(
        time_step_secs = config.totp.time_step_secs,
        window = config.totp.window,
        admin_api = config.admin_token.is_some(),
        "Configuration loaded from {}",
        args.config
    );

    // Initialize application state
    let state = AppState::new(config.clone()).await?;
    info!("Redis connected: {}", config.redis_url);

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Outpost listening on {}", config.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Outpost shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}
