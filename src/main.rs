//! Sensor Anomaly Server
//!
//! Loads the fitted scaler and detector once, then serves the scoring API.
//! A missing or corrupt artifact aborts startup before the port is bound.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sensor_anomaly::{config::Config, create_router, ml::ModelStore, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sensor_anomaly=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() || config.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Sensor Anomaly Server starting...");
    tracing::info!("Environment: {}", config.environment);

    // Load model artifacts
    let models = ModelStore::load(&config.model_dir).with_context(|| {
        format!("failed to load model artifacts from {}", config.model_dir.display())
    })?;

    // Build application state
    let state = AppState {
        models: Arc::new(models),
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
