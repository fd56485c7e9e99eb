//! Scoring request/response models

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::record::{RawRecord, ScoredRecordSet};

/// Body of `POST /api/score`
#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    #[serde(alias = "rows")]
    pub data: Vec<RawRecord>,
}

/// Body of `POST /api/detect-anomaly`
#[derive(Debug, Deserialize, Validate)]
pub struct DetectRequest {
    #[serde(alias = "rows")]
    #[validate(length(min = 1, message = "data must contain at least one row"))]
    pub data: Vec<RawRecord>,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub anomaly_scores: Vec<f64>,
    pub anomalies: Vec<bool>,
}

impl From<&ScoredRecordSet> for ScoreResponse {
    fn from(set: &ScoredRecordSet) -> Self {
        Self {
            anomaly_scores: set.anomaly_scores(),
            anomalies: set.anomalies(),
        }
    }
}

/// Ad-hoc results; scores only rank rows within this one batch
#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub anomaly_scores: Vec<f64>,
    pub anomalies: Vec<bool>,
    pub anomaly_count: usize,
    pub comparable_across_calls: bool,
}

impl From<&ScoredRecordSet> for DetectResponse {
    fn from(set: &ScoredRecordSet) -> Self {
        Self {
            anomaly_scores: set.anomaly_scores(),
            anomalies: set.anomalies(),
            anomaly_count: set.anomaly_count(),
            comparable_across_calls: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub rows: usize,
    pub anomalies: usize,
    pub columns: Vec<String>,
    pub data: Vec<RawRecord>,
}

impl UploadResponse {
    pub fn new(filename: String, set: &ScoredRecordSet) -> Self {
        Self {
            filename,
            rows: set.len(),
            anomalies: set.anomaly_count(),
            columns: set.column_names(),
            data: set.to_rows(),
        }
    }
}
