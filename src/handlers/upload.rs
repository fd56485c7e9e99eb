//! CSV upload handler

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;

use crate::models::{ScoringSummary, UploadResponse};
use crate::{ingest, pipeline, AppError, AppResult, AppState};

/// Multipart field carrying the CSV file
const FILE_FIELD: &str = "file";

/// Upload a CSV of readings and score every row with the pre-trained model
pub async fn upload_csv(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<UploadResponse>> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.csv").to_string();
        let data = field.bytes().await?;
        tracing::info!("Received file: {} ({} bytes)", filename, data.len());

        let records = ingest::parse_csv(&data)?;
        let result = pipeline::score(&state.models, records)?;

        let summary = ScoringSummary::from(&result);
        tracing::info!(
            "Scored {}: {} rows, {} anomalies, max score {:?}",
            filename,
            summary.rows,
            summary.anomalies,
            summary.max_score
        );

        return Ok(Json(UploadResponse::new(filename, &result)));
    }

    Err(AppError::ValidationError(format!(
        "multipart field '{}' is required",
        FILE_FIELD
    )))
}
