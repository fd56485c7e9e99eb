//! Artifact Store
//!
//! Loads the fitted scaler and detector once at startup. The store is
//! immutable afterwards and shared across requests behind an `Arc`.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

use super::{
    Contamination, FeatureScaler, IsolationForest, ModelError, ModelResult, OutlierDetector,
    StandardScaler,
};

/// Scaler artifact file name inside the model directory
pub const SCALER_FILE: &str = "scaler.json";

/// Detector artifact file name inside the model directory
pub const DETECTOR_FILE: &str = "isolation_forest.json";

/// Provenance of the loaded artifacts, reported by `/health`
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub model_dir: String,
    pub scaler_sha256: String,
    pub detector_sha256: String,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub contamination: Contamination,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ModelStore {
    scaler: StandardScaler,
    detector: IsolationForest,
    info: ArtifactInfo,
}

impl ModelStore {
    /// Load and validate both artifacts from `dir`
    pub fn load(dir: &Path) -> ModelResult<Self> {
        tracing::info!("Loading model artifacts from: {}", dir.display());

        let (scaler, scaler_sha256): (StandardScaler, _) = read_artifact(&dir.join(SCALER_FILE))?;
        scaler.validate()?;

        let (detector, detector_sha256): (IsolationForest, _) =
            read_artifact(&dir.join(DETECTOR_FILE))?;
        detector.validate()?;

        let info = ArtifactInfo {
            model_dir: dir.display().to_string(),
            scaler_sha256,
            detector_sha256,
            n_estimators: detector.trees.len(),
            max_samples: detector.max_samples,
            contamination: detector.contamination,
            loaded_at: Utc::now(),
        };

        tracing::info!(
            "Model artifacts loaded: {} trees, scaler {}, detector {}",
            info.n_estimators,
            &info.scaler_sha256[..12],
            &info.detector_sha256[..12]
        );

        Ok(Self {
            scaler,
            detector,
            info,
        })
    }

    /// Build a store from in-memory models
    pub fn from_parts(scaler: StandardScaler, detector: IsolationForest) -> ModelResult<Self> {
        scaler.validate()?;
        detector.validate()?;

        let info = ArtifactInfo {
            model_dir: "<memory>".to_string(),
            scaler_sha256: checksum(&to_json(&scaler)?),
            detector_sha256: checksum(&to_json(&detector)?),
            n_estimators: detector.trees.len(),
            max_samples: detector.max_samples,
            contamination: detector.contamination,
            loaded_at: Utc::now(),
        };

        Ok(Self {
            scaler,
            detector,
            info,
        })
    }

    /// Write both artifacts into `dir`, creating it if needed
    pub fn save(
        dir: &Path,
        scaler: &StandardScaler,
        detector: &IsolationForest,
    ) -> ModelResult<()> {
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

        for (file, bytes) in [
            (SCALER_FILE, to_json(scaler)?),
            (DETECTOR_FILE, to_json(detector)?),
        ] {
            let path = dir.join(file);
            fs::write(&path, bytes).map_err(|e| io_error(&path, e))?;
            tracing::info!("Wrote artifact: {}", path.display());
        }
        Ok(())
    }

    pub fn scaler(&self) -> &dyn FeatureScaler {
        &self.scaler
    }

    pub fn detector(&self) -> &dyn OutlierDetector {
        &self.detector
    }

    pub fn info(&self) -> &ArtifactInfo {
        &self.info
    }
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> ModelResult<(T, String)> {
    if !path.exists() {
        return Err(ModelError::ArtifactMissing(path.display().to_string()));
    }

    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    let value = serde_json::from_slice(&bytes).map_err(|source| ModelError::Corrupt {
        path: path.display().to_string(),
        source,
    })?;

    Ok((value, checksum(&bytes)))
}

fn to_json<T: Serialize>(value: &T) -> ModelResult<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|source| ModelError::Corrupt {
        path: "<memory>".to_string(),
        source,
    })
}

fn checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn io_error(path: &Path, source: std::io::Error) -> ModelError {
    ModelError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::IsolationForestParams;
    use ndarray::array;

    fn fitted() -> (StandardScaler, IsolationForest) {
        let x = array![[20.0, 45.0, 310.0], [21.0, 46.0, 312.0], [22.0, 44.0, 309.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        let scaled = scaler.transform(&x).unwrap();
        let params = IsolationForestParams {
            n_estimators: 10,
            ..Default::default()
        }
        .with_seed(Some(5));
        let forest = IsolationForest::fit(&scaled, &params).unwrap();
        (scaler, forest)
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let (scaler, forest) = fitted();
        ModelStore::save(dir.path(), &scaler, &forest).unwrap();

        let store = ModelStore::load(dir.path()).unwrap();
        assert_eq!(store.info().n_estimators, 10);
        assert_eq!(store.info().scaler_sha256.len(), 64);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, ModelError::ArtifactMissing(_)));
    }

    #[test]
    fn test_corrupt_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (scaler, forest) = fitted();
        ModelStore::save(dir.path(), &scaler, &forest).unwrap();
        fs::write(dir.path().join(DETECTOR_FILE), b"{ not json").unwrap();

        let err = ModelStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, ModelError::Corrupt { .. }));
    }

    #[test]
    fn test_layout_mismatch_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (mut scaler, forest) = fitted();
        scaler.layout.feature_names.push("pressure".to_string());
        ModelStore::save(dir.path(), &scaler, &forest).unwrap();

        let err = ModelStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, ModelError::LayoutMismatch { .. }));
    }
}
