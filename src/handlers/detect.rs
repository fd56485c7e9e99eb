//! Ad-hoc fit-and-score handler
//!
//! Fits a fresh detector on each request's rows. Scores are relative to
//! that batch only and must not be compared across calls.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use validator::Validate;

use crate::ml::{Contamination, IsolationForestParams};
use crate::models::{DetectRequest, DetectResponse};
use crate::{pipeline, AppError, AppResult, AppState};

pub async fn detect_anomaly(
    State(state): State<AppState>,
    payload: Result<Json<DetectRequest>, JsonRejection>,
) -> AppResult<Json<DetectResponse>> {
    let Json(req) = payload?;
    req.validate()?;

    if req.data.len() > state.config.max_fit_rows {
        return Err(AppError::ValidationError(format!(
            "batch of {} rows exceeds the ad-hoc limit of {}",
            req.data.len(),
            state.config.max_fit_rows
        )));
    }

    let params = IsolationForestParams {
        n_estimators: state.config.adhoc_trees,
        contamination: Contamination::Auto,
        ..Default::default()
    }
    .with_seed(state.config.adhoc_random_seed);

    // Fitting is CPU-bound; keep it off the async workers
    let result = tokio::task::spawn_blocking(move || pipeline::fit_and_score(req.data, &params))
        .await??;

    tracing::info!(
        "Ad-hoc fit scored {} rows, {} anomalies",
        result.len(),
        result.anomaly_count()
    );
    Ok(Json(DetectResponse::from(&result)))
}
