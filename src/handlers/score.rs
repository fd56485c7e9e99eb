//! Pre-trained scoring handler

use axum::{extract::rejection::JsonRejection, extract::State, Json};

use crate::models::{ScoreRequest, ScoreResponse};
use crate::{pipeline, AppResult, AppState};

/// Score JSON rows with the pre-trained model
pub async fn score(
    State(state): State<AppState>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> AppResult<Json<ScoreResponse>> {
    let Json(req) = payload?;
    let rows = req.data.len();

    let result = pipeline::score(&state.models, req.data)?;

    tracing::info!("Scored {} rows, {} anomalies", rows, result.anomaly_count());
    Ok(Json(ScoreResponse::from(&result)))
}
