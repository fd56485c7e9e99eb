//! Sensor Anomaly Service
//!
//! Backend for the IoT sensor health dashboard: accepts tabular readings
//! (CSV upload or JSON rows) and returns per-row anomaly flags and scores.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 SENSOR ANOMALY SERVICE                   │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐   ┌──────────────────┐  │
//! │  │  API       │──▶│  CSV       │──▶│ Scoring Pipeline │  │
//! │  │  (Axum)    │   │  Ingest    │   │ normalize/impute │  │
//! │  └─────┬──────┘   └────────────┘   │ scale/classify   │  │
//! │        └──────── JSON rows ───────▶└────────┬─────────┘  │
//! │                                             ▼            │
//! │                               ┌──────────────────────┐   │
//! │                               │ ModelStore (Arc, RO) │   │
//! │                               └──────────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod ml;
pub mod models;
pub mod pipeline;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub models: Arc<ml::ModelStore>,
    pub config: config::Config,
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    let api_routes = Router::new()
        // Pre-trained model
        .route("/api/score", post(handlers::score::score))
        .route("/api/upload-csv", post(handlers::upload::upload_csv))
        // Ad-hoc fit per request
        .route("/api/detect-anomaly", post(handlers::detect::detect_anomaly))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::check))
        .merge(api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
