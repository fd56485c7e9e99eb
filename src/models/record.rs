//! Record models

use serde::Serialize;
use serde_json::{Map, Value};

use crate::ml::features::{FEATURE_COUNT, FEATURE_LAYOUT, TIME_COLUMN};

/// One input row: column name → cell value, in source column order
pub type RawRecord = Map<String, Value>;

/// Ordered rows as received from the CSV ingester or a JSON payload
pub type RawRecordSet = Vec<RawRecord>;

/// A raw row after scoring
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    /// Normalized source columns (canonical names, imputed features)
    pub columns: RawRecord,
    pub features: [f64; FEATURE_COUNT],
    pub anomaly: bool,
    /// Negated decision value, higher = more anomalous
    pub anomaly_score: f64,
    pub time: String,
}

impl ScoredRecord {
    /// Source columns with the derived fields merged in
    pub fn to_row(&self) -> RawRecord {
        let mut row = self.columns.clone();
        row.insert("anomaly".to_string(), Value::Bool(self.anomaly));
        row.insert("anomaly_score".to_string(), Value::from(self.anomaly_score));
        row.insert(TIME_COLUMN.to_string(), Value::String(self.time.clone()));
        row
    }
}

/// Scored rows, positionally aligned with the input
#[derive(Debug, Clone, Default)]
pub struct ScoredRecordSet {
    pub records: Vec<ScoredRecord>,
}

impl ScoredRecordSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn anomaly_scores(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.anomaly_score).collect()
    }

    pub fn anomalies(&self) -> Vec<bool> {
        self.records.iter().map(|r| r.anomaly).collect()
    }

    pub fn anomaly_count(&self) -> usize {
        self.records.iter().filter(|r| r.anomaly).count()
    }

    /// Union of output column names, in first-seen order
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let derived = ["anomaly", "anomaly_score", TIME_COLUMN];
        let all = self
            .records
            .iter()
            .flat_map(|r| r.columns.keys().map(String::as_str))
            .chain(FEATURE_LAYOUT.iter().copied())
            .chain(derived);

        for name in all {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    pub fn to_rows(&self) -> Vec<RawRecord> {
        self.records.iter().map(ScoredRecord::to_row).collect()
    }
}

/// Per-batch summary logged after scoring an upload
#[derive(Debug, Clone, Serialize)]
pub struct ScoringSummary {
    pub rows: usize,
    pub anomalies: usize,
    pub max_score: Option<f64>,
}

impl From<&ScoredRecordSet> for ScoringSummary {
    fn from(set: &ScoredRecordSet) -> Self {
        Self {
            rows: set.len(),
            anomalies: set.anomaly_count(),
            max_score: set
                .records
                .iter()
                .map(|r| r.anomaly_score)
                .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |m| m.max(s)))),
        }
    }
}
