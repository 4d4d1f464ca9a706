//! # Intercom Server
//!
//! Realtime call manager: client registration and discovery over a
//! WebSocket event channel, directed audio calls anchored on a media
//! bridge conference.
//!
//! ## Usage
//!
//! ```bash
//! # Run with defaults (reads intercom.toml if present)
//! INTERCOM_AUTH_SECRET=... intercom
//!
//! # Run with environment variables
//! INTERCOM_PORT=8080 INTERCOM_HOST=0.0.0.0 INTERCOM_AUTH_SECRET=... intercom
//! ```

mod auth;
mod bridge;
mod config;
mod handlers;
mod metrics;
mod registry;

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intercom=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Intercom server on {}:{}", config.host, config.port);

    // Initialize metrics
    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::warn!("Metrics server failed to start: {}", e);
        }
    }

    // Start the server
    let state = Arc::new(handlers::AppState::from_config(config)?);
    handlers::run_server(state).await?;

    Ok(())
}
