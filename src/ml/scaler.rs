//! Standard Scaler
//!
//! Centers each feature on its training mean and divides by the training
//! standard deviation (population, ddof = 0).

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::features::{LayoutInfo, FEATURE_COUNT};
use super::{check_width, FeatureScaler, ModelError, ModelResult};

/// Fitted standard scaler, persisted as `scaler.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub layout: LayoutInfo,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub n_samples_seen: usize,
}

impl StandardScaler {
    /// Fit on a `rows × FEATURE_COUNT` matrix
    pub fn fit(x: &Array2<f64>) -> ModelResult<Self> {
        check_width(x, FEATURE_COUNT)?;

        let mean = x.mean_axis(Axis(0)).ok_or(ModelError::EmptySample)?;
        let std = x.std_axis(Axis(0), 0.0);
        let scale = handle_zeros_in_scale(&std, &mean);

        Ok(Self {
            layout: LayoutInfo::current(),
            mean: mean.to_vec(),
            scale,
            n_samples_seen: x.nrows(),
        })
    }

    /// Check a deserialized scaler against the compiled feature layout
    pub fn validate(&self) -> ModelResult<()> {
        if !self.layout.is_compatible() {
            return Err(ModelError::LayoutMismatch {
                expected: LayoutInfo::current().hash,
                actual: self.layout.hash,
            });
        }
        for params in [&self.mean, &self.scale] {
            if params.len() != FEATURE_COUNT {
                return Err(ModelError::ShapeMismatch {
                    expected: FEATURE_COUNT,
                    actual: params.len(),
                });
            }
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(ModelError::InvalidParameter(
                "scaler scale must be finite and non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, x: &Array2<f64>) -> ModelResult<Array2<f64>> {
        check_width(x, self.mean.len())?;

        let mean = Array1::from(self.mean.clone());
        let scale = Array1::from(self.scale.clone());
        Ok((x - &mean) / &scale)
    }
}

/// Constant features get a unit scale so they map to 0 instead of NaN
fn handle_zeros_in_scale(std: &Array1<f64>, mean: &Array1<f64>) -> Vec<f64> {
    std.iter()
        .zip(mean.iter())
        .map(|(&s, &m)| {
            let tolerance = 10.0 * f64::EPSILON * m.abs().max(1.0);
            if s < tolerance { 1.0 } else { s }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_centers_data() {
        let x = array![[1.0, 10.0, 100.0], [3.0, 20.0, 300.0]];
        let scaler = StandardScaler::fit(&x).unwrap();

        assert_eq!(scaler.mean, vec![2.0, 15.0, 200.0]);
        assert_eq!(scaler.scale, vec![1.0, 5.0, 100.0]);

        let z = scaler.transform(&x).unwrap();
        assert_eq!(z, array![[-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]]);
    }

    #[test]
    fn test_constant_feature_gets_unit_scale() {
        let x = array![[0.1, 5.0, 0.0], [0.1, 7.0, 0.0], [0.1, 9.0, 0.0]];
        let scaler = StandardScaler::fit(&x).unwrap();

        assert_eq!(scaler.scale[0], 1.0);
        assert_eq!(scaler.scale[2], 1.0);
        assert!(scaler.transform(&x).unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_fit_empty_fails() {
        let x = Array2::<f64>::zeros((0, FEATURE_COUNT));
        assert!(matches!(StandardScaler::fit(&x), Err(ModelError::EmptySample)));
    }

    #[test]
    fn test_transform_rejects_wrong_width() {
        let scaler = StandardScaler::fit(&array![[1.0, 2.0, 3.0]]).unwrap();
        let result = scaler.transform(&array![[1.0, 2.0]]);
        assert!(matches!(result, Err(ModelError::ShapeMismatch { expected: 3, actual: 2 })));
    }

    #[test]
    fn test_validate_rejects_foreign_layout() {
        let mut scaler = StandardScaler::fit(&array![[1.0, 2.0, 3.0]]).unwrap();
        assert!(scaler.validate().is_ok());

        scaler.layout.hash ^= 0xdead_beef;
        assert!(matches!(scaler.validate(), Err(ModelError::LayoutMismatch { .. })));
    }
}
