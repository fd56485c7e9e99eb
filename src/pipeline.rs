//! Scoring Pipeline
//!
//! Turns a raw record set into scored records. Two entry points with
//! different contracts:
//!
//! - [`score`]: pre-trained scaler + detector from the [`ModelStore`].
//!   Scores are comparable across calls.
//! - [`fit_and_score`]: fits a throwaway isolation forest on the batch
//!   itself and scores that same batch. Scores only rank rows within the
//!   batch and are **not** comparable across calls.
//!
//! Both share the same preparation: normalize column names, resolve
//! aliases, backfill and impute the feature columns, synthesize `time`.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde_json::Value;

use crate::ml::features::{
    canonical_column_name, is_null_marker, FEATURE_COUNT, FEATURE_LAYOUT, TIME_COLUMN,
};
use crate::ml::{
    FeatureScaler, IsolationForest, IsolationForestParams, ModelError, ModelStore,
    OutlierDetector, OUTLIER_LABEL,
};
use crate::models::{RawRecord, ScoredRecord, ScoredRecordSet};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("row {row}: columns '{first}' and '{second}' both map to '{column}'")]
    ColumnCollision {
        row: usize,
        column: String,
        first: String,
        second: String,
    },

    #[error("row {row}: feature '{column}' has non-numeric value {value}")]
    NonNumericFeature {
        row: usize,
        column: String,
        value: String,
    },

    #[error("at least one row is required")]
    EmptyBatch,

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Rows after preparation, plus their `rows × FEATURE_COUNT` matrix
struct PreparedBatch {
    rows: Vec<RawRecord>,
    features: Vec<[f64; FEATURE_COUNT]>,
}

impl PreparedBatch {
    fn matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.features.len(), FEATURE_COUNT), |(i, j)| self.features[i][j])
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Score records with the pre-trained scaler and detector
pub fn score(models: &ModelStore, records: Vec<RawRecord>) -> PipelineResult<ScoredRecordSet> {
    let batch = prepare(records)?;
    let scaled = models.scaler().transform(&batch.matrix())?;

    let result = classify(batch, models.detector(), &scaled)?;
    tracing::debug!(
        "Scored {} rows with pre-trained model, {} anomalies",
        result.len(),
        result.anomaly_count()
    );
    Ok(result)
}

/// Fit a fresh detector on this batch and score the same batch with it
pub fn fit_and_score(
    records: Vec<RawRecord>,
    params: &IsolationForestParams,
) -> PipelineResult<ScoredRecordSet> {
    if records.is_empty() {
        return Err(PipelineError::EmptyBatch);
    }

    let batch = prepare(records)?;
    let matrix = batch.matrix();
    let detector = IsolationForest::fit(&matrix, params)?;

    let result = classify(batch, &detector, &matrix)?;
    tracing::debug!(
        "Ad-hoc fit scored {} rows, {} anomalies",
        result.len(),
        result.anomaly_count()
    );
    Ok(result)
}

/// Normalized, imputed feature matrix of a record set (training input)
pub fn feature_matrix(records: Vec<RawRecord>) -> PipelineResult<Array2<f64>> {
    Ok(prepare(records)?.matrix())
}

// ============================================================================
// STEPS
// ============================================================================

fn prepare(records: Vec<RawRecord>) -> PipelineResult<PreparedBatch> {
    let mut rows = Vec::with_capacity(records.len());
    let mut features = Vec::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        let mut row = normalize_columns(record, index)?;
        let vector = extract_features(&row, index)?;

        for (name, value) in FEATURE_LAYOUT.iter().zip(vector) {
            let keep_original = matches!(row.get(*name), Some(Value::Number(_)));
            if !keep_original {
                row.insert(name.to_string(), Value::from(value));
            }
        }

        rows.push(row);
        features.push(vector);
    }

    Ok(PreparedBatch { rows, features })
}

/// Lower-case, trim and alias every column name of one row
fn normalize_columns(record: RawRecord, row: usize) -> PipelineResult<RawRecord> {
    let mut normalized = RawRecord::with_capacity(record.len());
    let mut sources: HashMap<String, String> = HashMap::with_capacity(record.len());

    for (name, value) in record {
        let canonical = canonical_column_name(&name);
        if let Some(first) = sources.insert(canonical.clone(), name.clone()) {
            return Err(PipelineError::ColumnCollision {
                row,
                column: canonical,
                first,
                second: name,
            });
        }
        normalized.insert(canonical, value);
    }

    Ok(normalized)
}

/// Read the feature vector of a normalized row; absent and null cells are 0
fn extract_features(row: &RawRecord, index: usize) -> PipelineResult<[f64; FEATURE_COUNT]> {
    let mut vector = [0.0; FEATURE_COUNT];

    for (slot, name) in vector.iter_mut().zip(FEATURE_LAYOUT) {
        let parsed = match row.get(*name) {
            None | Some(Value::Null) => Some(0.0),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) if is_null_marker(s) => Some(0.0),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };

        *slot = parsed
            .filter(|v| v.is_finite())
            .ok_or_else(|| PipelineError::NonNumericFeature {
                row: index,
                column: name.to_string(),
                value: row.get(*name).map(ToString::to_string).unwrap_or_default(),
            })?;
    }

    Ok(vector)
}

/// Stringified `time` cell, or the row's position when it has none
fn resolve_time(row: &RawRecord, index: usize) -> String {
    match row.get(TIME_COLUMN) {
        None | Some(Value::Null) => index.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn classify(
    batch: PreparedBatch,
    detector: &dyn OutlierDetector,
    x: &Array2<f64>,
) -> PipelineResult<ScoredRecordSet> {
    let labels: Array1<i8> = detector.predict(x)?;
    let decision: Array1<f64> = detector.decision_function(x)?;

    let records = batch
        .rows
        .into_iter()
        .zip(batch.features)
        .enumerate()
        .map(|(index, (columns, features))| ScoredRecord {
            time: resolve_time(&columns, index),
            anomaly: labels[index] == OUTLIER_LABEL,
            anomaly_score: -decision[index],
            features,
            columns,
        })
        .collect();

    Ok(ScoredRecordSet { records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::StandardScaler;
    use serde_json::json;

    /// Readings in the healthy band the dashboard simulates
    fn healthy_matrix() -> Array2<f64> {
        let mut rows = Vec::new();
        for i in 0..120 {
            rows.extend([
                21.0 + (i % 4) as f64 * 0.75,
                43.0 + (i % 6) as f64,
                305.0 + (i % 16) as f64,
            ]);
        }
        Array2::from_shape_vec((120, 3), rows).unwrap()
    }

    fn store() -> ModelStore {
        let x = healthy_matrix();
        let scaler = StandardScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x).unwrap();
        let params = IsolationForestParams::default().with_seed(Some(2024));
        let forest = IsolationForest::fit(&scaled, &params).unwrap();
        ModelStore::from_parts(scaler, forest).unwrap()
    }

    fn records(value: serde_json::Value) -> Vec<RawRecord> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_row_count_and_order_preserved() {
        let input = records(json!([
            {"temperature": 22.0, "humidity": 45, "gas": 310, "id": "a"},
            {"temperature": 23.0, "humidity": 46, "gas": 311, "id": "b"},
            {"temperature": 90.0, "humidity": 5, "gas": 900, "id": "c"},
        ]));
        let result = score(&store(), input).unwrap();

        assert_eq!(result.len(), 3);
        let ids: Vec<_> = result.records.iter().map(|r| r.columns["id"].clone()).collect();
        assert_eq!(ids, vec![json!("a"), json!("b"), json!("c")]);
        assert_eq!(result.records[2].features, [90.0, 5.0, 900.0]);
    }

    #[test]
    fn test_alias_equivalence() {
        let models = store();
        let aliased = records(json!([{"temp": 50, "humidity": 10, "gas_level": 2}]));
        let canonical = records(json!([{"temperature": 50, "humidity": 10, "gas": 2}]));
        let aliased = score(&models, aliased).unwrap();
        let canonical = score(&models, canonical).unwrap();

        assert_eq!(aliased.records[0].features, canonical.records[0].features);
        assert_eq!(aliased.anomaly_scores(), canonical.anomaly_scores());
        assert!(aliased.records[0].columns.contains_key("temperature"));
        assert!(!aliased.records[0].columns.contains_key("temp"));
    }

    #[test]
    fn test_column_names_are_normalized() {
        let input = records(json!([{" Temp ": 21, "HUMIDITY": 44, "Gas_Level": 306}]));
        let result = score(&store(), input).unwrap();
        assert_eq!(result.records[0].features, [21.0, 44.0, 306.0]);
    }

    #[test]
    fn test_missing_columns_default_to_zero() {
        let result = score(&store(), records(json!([{"temperature": 50}]))).unwrap();
        let record = &result.records[0];

        assert_eq!(record.features, [50.0, 0.0, 0.0]);
        assert_eq!(record.columns["humidity"], json!(0.0));
        assert_eq!(record.columns["gas"], json!(0.0));
    }

    #[test]
    fn test_nulls_are_imputed() {
        let input = records(json!([
            {"temperature": null, "humidity": "", "gas": "NaN"},
            {"temperature": "22.5", "humidity": " 44 ", "gas": 310},
        ]));
        let result = score(&store(), input).unwrap();

        assert_eq!(result.records[0].features, [0.0, 0.0, 0.0]);
        assert_eq!(result.records[1].features, [22.5, 44.0, 310.0]);
        assert_eq!(result.records[1].columns["gas"], json!(310));
    }

    #[test]
    fn test_time_synthesis() {
        let input = records(json!([{"temperature": 1}, {"temperature": 2}]));
        let result = score(&store(), input).unwrap();
        let times: Vec<_> = result.records.iter().map(|r| r.time.as_str()).collect();
        assert_eq!(times, vec!["0", "1"]);

        let input = records(json!([{"temperature": 1, "time": "2024-01-01T00:00"}]));
        let result = score(&store(), input).unwrap();
        assert_eq!(result.records[0].time, "2024-01-01T00:00");
    }

    #[test]
    fn test_time_mixed_rows() {
        let input = records(json!([
            {"temperature": 1, "time": 1700000000},
            {"temperature": 2},
        ]));
        let result = score(&store(), input).unwrap();
        assert_eq!(result.records[0].time, "1700000000");
        assert_eq!(result.records[1].time, "1");
    }

    #[test]
    fn test_every_row_is_complete() {
        let input = records(json!([{}, {"humidity": 40}, {"other": "x"}]));
        let result = score(&store(), input).unwrap();

        for row in result.to_rows() {
            assert!(row["anomaly"].is_boolean());
            assert!(row["anomaly_score"].is_number());
            assert!(row["time"].is_string());
            for name in FEATURE_LAYOUT {
                assert!(row[*name].is_number());
            }
        }
    }

    #[test]
    fn test_score_sign_convention() {
        let input = records(json!([
            {"temperature": 22.0, "humidity": 45, "gas": 310},
            {"temperature": 21.75, "humidity": 46, "gas": 312},
            {"temperature": 95.0, "humidity": 2, "gas": 2000},
            {"temperature": -40.0, "humidity": 99, "gas": 0},
        ]));
        let result = score(&store(), input).unwrap();

        assert!(result.records[2].anomaly);
        assert!(result.records[3].anomaly);

        let (flagged, normal): (Vec<_>, Vec<_>) = result.records.iter().partition(|r| r.anomaly);
        let flagged: Vec<f64> = flagged.iter().map(|r| r.anomaly_score).collect();
        let normal: Vec<f64> = normal.iter().map(|r| r.anomaly_score).collect();
        for a in &flagged {
            assert!(*a > 0.0);
            for n in &normal {
                assert!(a >= n, "anomaly score {} below inlier score {}", a, n);
            }
        }
    }

    #[test]
    fn test_column_collision_rejected() {
        let err = score(&store(), records(json!([{"Temp": 1, "temperature": 2}]))).unwrap_err();
        assert!(matches!(err, PipelineError::ColumnCollision { row: 0, .. }));

        let input = records(json!([{"gas": 1}, {"GAS": 1, " gas": 2}]));
        let err = score(&store(), input).unwrap_err();
        assert!(matches!(err, PipelineError::ColumnCollision { row: 1, .. }));
    }

    #[test]
    fn test_non_numeric_feature_rejects_request() {
        let input = records(json!([
            {"temperature": 22},
            {"temperature": "hot"},
        ]));
        match score(&store(), input).unwrap_err() {
            PipelineError::NonNumericFeature { row, column, value } => {
                assert_eq!(row, 1);
                assert_eq!(column, "temperature");
                assert_eq!(value, "\"hot\"");
            }
            other => panic!("unexpected error: {}", other),
        }

        assert!(score(&store(), records(json!([{"gas": true}]))).is_err());
        assert!(score(&store(), records(json!([{"humidity": "inf"}]))).is_err());
    }

    #[test]
    fn test_feature_matrix() {
        let input = records(json!([{"TEMP": 20, "gas_level": "7"}, {"humidity": 3}]));
        let x = feature_matrix(input).unwrap();
        assert_eq!(x, ndarray::array![[20.0, 0.0, 7.0], [0.0, 3.0, 0.0]]);
    }

    #[test]
    fn test_empty_batch() {
        assert!(score(&store(), Vec::new()).unwrap().is_empty());
        assert!(matches!(
            fit_and_score(Vec::new(), &IsolationForestParams::default()),
            Err(PipelineError::EmptyBatch)
        ));
    }

    fn adhoc_batch() -> Vec<RawRecord> {
        let mut rows: Vec<serde_json::Value> = (0..40)
            .map(|i| {
                json!({"temp": 21 + i % 3, "humidity": 44 + i % 4, "gas_level": 305 + i % 9})
            })
            .collect();
        rows.push(json!({"temp": 80, "humidity": 3, "gas_level": 1500}));
        records(serde_json::Value::Array(rows))
    }

    #[test]
    fn test_fit_and_score_flags_batch_outlier() {
        let params = IsolationForestParams::default().with_seed(Some(9));
        let result = fit_and_score(adhoc_batch(), &params).unwrap();

        assert_eq!(result.len(), 41);
        assert!(result.records[40].anomaly);
        let max = result.anomaly_scores().into_iter().fold(f64::MIN, f64::max);
        assert_eq!(result.records[40].anomaly_score, max);
    }

    #[test]
    fn test_fit_and_score_seeded_is_deterministic() {
        let params = IsolationForestParams::default().with_seed(Some(77));
        let a = fit_and_score(adhoc_batch(), &params).unwrap();
        let b = fit_and_score(adhoc_batch(), &params).unwrap();
        assert_eq!(a.anomaly_scores(), b.anomaly_scores());
    }

    #[test]
    fn test_fit_and_score_extreme_finite_values() {
        let input = records(json!([
            {"temperature": 1.7e308, "humidity": 40, "gas": 300},
            {"temperature": -1.7e308, "humidity": 41, "gas": 301},
            {"temperature": 20, "humidity": 42, "gas": 302},
        ]));
        let params = IsolationForestParams::default().with_seed(Some(1));
        let result = fit_and_score(input, &params).unwrap();

        assert_eq!(result.len(), 3);
        assert!(result.anomaly_scores().iter().all(|s| s.is_finite()));
    }
}
