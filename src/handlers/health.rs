//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::ml::ArtifactInfo;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
    model: ArtifactInfo,
}

#[derive(Serialize)]
pub struct RootResponse {
    status: &'static str,
    service: &'static str,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
        model: state.models.info().clone(),
    })
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "running",
        service: env!("CARGO_PKG_NAME"),
    })
}
