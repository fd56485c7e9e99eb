//! Model Module - Fitted Scaler and Fitted Detector
//!
//! The pipeline only talks to the two traits below, so the concrete
//! scaler/detector can be swapped without touching request handling.

pub mod features;
pub mod scaler;
pub mod isolation_forest;
pub mod store;

use ndarray::{Array1, Array2};

pub use features::{FEATURE_COUNT, FEATURE_LAYOUT};
pub use scaler::StandardScaler;
pub use isolation_forest::{Contamination, IsolationForest, IsolationForestParams};
pub use store::{ArtifactInfo, ModelStore, SCALER_FILE, DETECTOR_FILE};

/// Label returned by [`OutlierDetector::predict`] for an outlier
pub const OUTLIER_LABEL: i8 = -1;

/// Label returned by [`OutlierDetector::predict`] for an inlier
pub const INLIER_LABEL: i8 = 1;

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("artifact not found: {0}")]
    ArtifactMissing(String),

    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt artifact {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("feature layout mismatch: artifact has hash {actual:08x}, expected {expected:08x}")]
    LayoutMismatch { expected: u32, actual: u32 },

    #[error("expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("model is not fitted")]
    NotFitted,

    #[error("invalid model parameter: {0}")]
    InvalidParameter(String),

    #[error("cannot fit on an empty sample")]
    EmptySample,
}

pub type ModelResult<T> = Result<T, ModelError>;

// ============================================================================
// TRAITS
// ============================================================================

/// Transform from raw feature space to the space the detector was fit in
pub trait FeatureScaler: Send + Sync {
    fn transform(&self, x: &Array2<f64>) -> ModelResult<Array2<f64>>;
}

/// Binary outlier classifier with a continuous decision value
pub trait OutlierDetector: Send + Sync {
    /// Raw abnormality of each sample (lower = more abnormal)
    fn score_samples(&self, x: &Array2<f64>) -> ModelResult<Array1<f64>>;

    /// Offset between `score_samples` and the decision boundary
    fn offset(&self) -> f64;

    /// Negative for outliers, positive for inliers
    fn decision_function(&self, x: &Array2<f64>) -> ModelResult<Array1<f64>> {
        let offset = self.offset();
        Ok(self.score_samples(x)?.mapv(|s| s - offset))
    }

    /// [`OUTLIER_LABEL`] or [`INLIER_LABEL`] per sample
    fn predict(&self, x: &Array2<f64>) -> ModelResult<Array1<i8>> {
        Ok(self
            .decision_function(x)?
            .mapv(|d| if d < 0.0 { OUTLIER_LABEL } else { INLIER_LABEL }))
    }
}

/// Reject matrices whose column count does not match the feature layout
pub(crate) fn check_width(x: &Array2<f64>, expected: usize) -> ModelResult<()> {
    if x.ncols() != expected {
        return Err(ModelError::ShapeMismatch {
            expected,
            actual: x.ncols(),
        });
    }
    Ok(())
}
