//! Isolation Forest
//!
//! Ensemble of randomly split trees; outliers are isolated in fewer splits
//! than inliers, so a short average path means an abnormal sample.
//!
//! Scoring follows the usual conventions:
//! - `score_samples = -2^(-E[h(x)] / c(max_samples))`
//! - `decision_function = score_samples - offset` (negative = outlier)
//! - `offset = -0.5` for `Contamination::Auto`, otherwise the training
//!   score percentile matching the contamination fraction

use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::features::{LayoutInfo, FEATURE_COUNT};
use super::{check_width, ModelError, ModelResult, OutlierDetector};

/// Euler–Mascheroni constant, used by the harmonic number approximation
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Subsample cap when `max_samples` is not set
pub const DEFAULT_MAX_SAMPLES: usize = 256;

/// Default number of trees
pub const DEFAULT_N_ESTIMATORS: usize = 100;

// ============================================================================
// PARAMETERS
// ============================================================================

/// How the decision boundary is placed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contamination {
    /// Fixed offset of -0.5
    Auto,
    /// Expected outlier fraction in (0, 0.5]
    Fraction(f64),
}

impl Default for Contamination {
    fn default() -> Self {
        Contamination::Auto
    }
}

impl FromStr for Contamination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Contamination::Auto);
        }
        let fraction: f64 = s
            .parse()
            .map_err(|_| format!("contamination must be 'auto' or a number, got '{}'", s))?;
        Ok(Contamination::Fraction(fraction))
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForestParams {
    pub n_estimators: usize,
    /// Subsample size per tree; `None` means `min(256, n_samples)`
    pub max_samples: Option<usize>,
    pub contamination: Contamination,
    /// Fixed seed for reproducible fits; `None` seeds from OS entropy
    pub random_state: Option<u64>,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: DEFAULT_N_ESTIMATORS,
            max_samples: None,
            contamination: Contamination::Auto,
            random_state: None,
        }
    }
}

impl IsolationForestParams {
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    fn validate(&self) -> ModelResult<()> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.max_samples == Some(0) {
            return Err(ModelError::InvalidParameter(
                "max_samples must be at least 1".to_string(),
            ));
        }
        if let Contamination::Fraction(c) = self.contamination {
            if !(c > 0.0 && c <= 0.5) {
                return Err(ModelError::InvalidParameter(format!(
                    "contamination must be in (0, 0.5], got {}",
                    c
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// TREES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

/// A single isolation tree stored as a flat node arena (root at index 0)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    pub nodes: Vec<Node>,
}

impl IsolationTree {
    fn build<R: Rng>(x: &Array2<f64>, sample: Vec<usize>, max_depth: usize, rng: &mut R) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, sample, 0, max_depth, rng);
        tree
    }

    fn grow<R: Rng>(
        &mut self,
        x: &Array2<f64>,
        sample: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: sample.len() });

        if depth >= max_depth || sample.len() <= 1 {
            return id;
        }

        // Only features that still vary inside this node can split it
        let candidates: Vec<(usize, f64, f64)> = (0..x.ncols())
            .filter_map(|feature| {
                let (lo, hi) = sample
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                        let v = x[[i, feature]];
                        (lo.min(v), hi.max(v))
                    });
                (lo < hi).then_some((feature, lo, hi))
            })
            .collect();

        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = split_threshold(lo, hi, rng.gen::<f64>());
        let (left, right): (Vec<usize>, Vec<usize>) =
            sample.into_iter().partition(|&i| x[[i, feature]] <= threshold);

        let left = self.grow(x, left, depth + 1, max_depth, rng);
        let right = self.grow(x, right, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    /// Edges from the root to the sample's leaf, plus `c(leaf size)`
    fn path_length(&self, row: ArrayView1<f64>) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[id] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }

    fn validate(&self, n_features: usize) -> ModelResult<()> {
        if self.nodes.is_empty() {
            return Err(ModelError::InvalidParameter("empty isolation tree".to_string()));
        }
        for (id, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                threshold,
                left,
                right,
            } = node
            {
                // Children are always appended after their parent
                let in_range = |child: usize| child > id && child < self.nodes.len();
                if *feature >= n_features
                    || !threshold.is_finite()
                    || !in_range(*left)
                    || !in_range(*right)
                {
                    return Err(ModelError::InvalidParameter(format!(
                        "malformed split node {}",
                        id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Point in `[lo, hi)` at fraction `u` of the way from `lo` to `hi`
///
/// Interpolates without forming `hi - lo`, which overflows for finite
/// bounds of opposite sign near `f64::MAX`.
fn split_threshold(lo: f64, hi: f64, u: f64) -> f64 {
    let t = lo * (1.0 - u) + hi * u;
    if t >= hi {
        lo
    } else {
        t.max(lo)
    }
}

/// Average path length of an unsuccessful BST search over `n` samples
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ============================================================================
// FOREST
// ============================================================================

/// Fitted isolation forest, persisted as `isolation_forest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    pub layout: LayoutInfo,
    pub n_features: usize,
    pub max_samples: usize,
    pub contamination: Contamination,
    pub offset: f64,
    pub trees: Vec<IsolationTree>,
}

impl IsolationForest {
    /// Fit on a `rows × FEATURE_COUNT` matrix
    pub fn fit(x: &Array2<f64>, params: &IsolationForestParams) -> ModelResult<Self> {
        params.validate()?;
        check_width(x, FEATURE_COUNT)?;

        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(ModelError::EmptySample);
        }

        let max_samples = params
            .max_samples
            .unwrap_or(DEFAULT_MAX_SAMPLES)
            .min(n_samples);
        let max_depth = (max_samples.max(2) as f64).log2().ceil() as usize;

        let mut rng = match params.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let trees = (0..params.n_estimators)
            .map(|_| {
                let sample = index::sample(&mut rng, n_samples, max_samples).into_vec();
                IsolationTree::build(x, sample, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            layout: LayoutInfo::current(),
            n_features: x.ncols(),
            max_samples,
            contamination: params.contamination,
            offset: -0.5,
            trees,
        };

        if let Contamination::Fraction(c) = params.contamination {
            let scores = forest.score_samples(x)?;
            forest.offset = percentile(scores.to_vec(), 100.0 * c);
        }

        tracing::debug!(
            "Isolation forest fitted: {} trees, {} samples/tree, offset {:.4}",
            forest.trees.len(),
            forest.max_samples,
            forest.offset
        );

        Ok(forest)
    }

    /// Check a deserialized forest against the compiled feature layout
    pub fn validate(&self) -> ModelResult<()> {
        if !self.layout.is_compatible() {
            return Err(ModelError::LayoutMismatch {
                expected: LayoutInfo::current().hash,
                actual: self.layout.hash,
            });
        }
        if self.n_features != FEATURE_COUNT {
            return Err(ModelError::ShapeMismatch {
                expected: FEATURE_COUNT,
                actual: self.n_features,
            });
        }
        if self.trees.is_empty() || self.max_samples == 0 {
            return Err(ModelError::NotFitted);
        }
        if !self.offset.is_finite() {
            return Err(ModelError::InvalidParameter("offset must be finite".to_string()));
        }
        self.trees.iter().try_for_each(|t| t.validate(self.n_features))
    }
}

impl OutlierDetector for IsolationForest {
    fn score_samples(&self, x: &Array2<f64>) -> ModelResult<Array1<f64>> {
        check_width(x, self.n_features)?;
        if self.trees.is_empty() {
            return Err(ModelError::NotFitted);
        }

        let denominator = self.trees.len() as f64 * average_path_length(self.max_samples);
        let scores = x
            .rows()
            .into_iter()
            .map(|row| {
                let depths: f64 = self.trees.iter().map(|t| t.path_length(row)).sum();
                let ratio = if denominator != 0.0 { depths / denominator } else { 1.0 };
                -(2f64.powf(-ratio))
            })
            .collect::<Vec<_>>();

        Ok(Array1::from(scores))
    }

    fn offset(&self) -> f64 {
        self.offset
    }
}

/// Linear-interpolated percentile, `q` in [0, 100]
fn percentile(mut values: Vec<f64>, q: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let pos = (q / 100.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}
