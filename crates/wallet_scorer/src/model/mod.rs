//! Gradient-boosted regression trees (squared-error objective) and exact
//! TreeSHAP attributions for the fitted ensemble.
//!
//! The booster follows the second-order formulation: every round fits a tree
//! to the gradient/hessian of the current predictions, leaf weights are
//! `-G / (H + lambda)` shrunk by the learning rate, and splits are chosen by
//! exact greedy search. Each node keeps its hessian cover so attributions can
//! be computed without the training data.

pub mod tree;
pub mod tree_shap;

use common::config::Model;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing::{debug, info};

use tree::{RegressionTree, TreeParams};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("cannot fit on an empty dataset")]
    EmptyDataset,

    #[error("row {row} has {got} features, expected {expected}")]
    DimensionMismatch {
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("{targets} targets for {rows} rows")]
    TargetMismatch { rows: usize, targets: usize },

    #[error("non-finite value at row {row}: {what}")]
    NonFinite { row: usize, what: String },

    #[error("invalid parameter: {0}")]
    InvalidParams(String),
}

/// Booster hyperparameters.
#[derive(Debug, Clone)]
pub struct GbmParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Shrinkage applied to every leaf weight
    pub learning_rate: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// Minimum gain required to split
    pub gamma: f64,
    /// Minimum hessian sum in each child
    pub min_child_weight: f64,
    /// Row sampling ratio per tree
    pub subsample: f64,
    /// Column sampling ratio per tree
    pub colsample_bytree: f64,
    /// Seed for row/column sampling
    pub seed: u64,
    /// Initial prediction; mean target when `None`
    pub base_score: Option<f64>,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self::from_config(&Model::default())
    }
}

impl GbmParams {
    pub fn from_config(m: &Model) -> Self {
        Self {
            n_estimators: m.n_estimators,
            max_depth: m.max_depth,
            learning_rate: m.learning_rate,
            reg_lambda: m.reg_lambda,
            gamma: m.gamma,
            min_child_weight: m.min_child_weight,
            subsample: m.subsample,
            colsample_bytree: m.colsample_bytree,
            seed: m.seed,
            base_score: m.base_score,
        }
    }

    fn validate(&self) -> Result<(), ModelError> {
        let ratio_ok = |r: f64| r > 0.0 && r <= 1.0;
        if !ratio_ok(self.subsample) || !ratio_ok(self.colsample_bytree) {
            return Err(ModelError::InvalidParams(
                "subsample and colsample_bytree must be in (0, 1]".to_string(),
            ));
        }
        if self.reg_lambda < 0.0 || self.min_child_weight < 0.0 || self.learning_rate <= 0.0 {
            return Err(ModelError::InvalidParams(
                "reg_lambda and min_child_weight must be >= 0, learning_rate > 0".to_string(),
            ));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            learning_rate: self.learning_rate,
            reg_lambda: self.reg_lambda,
            gamma: self.gamma,
            min_child_weight: self.min_child_weight,
        }
    }
}

/// Feature matrix with targets.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub feature_names: Vec<String>,
}

impl Dataset {
    pub fn new(features: Vec<Vec<f64>>, targets: Vec<f64>, feature_names: Vec<String>) -> Self {
        Self {
            features,
            targets,
            feature_names,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.is_empty() {
            return Err(ModelError::EmptyDataset);
        }
        if self.targets.len() != self.len() {
            return Err(ModelError::TargetMismatch {
                rows: self.len(),
                targets: self.targets.len(),
            });
        }
        let expected = self.num_features();
        for (row, (x, y)) in self.features.iter().zip(&self.targets).enumerate() {
            if x.len() != expected {
                return Err(ModelError::DimensionMismatch {
                    row,
                    got: x.len(),
                    expected,
                });
            }
            if let Some(j) = x.iter().position(|v| !v.is_finite()) {
                return Err(ModelError::NonFinite {
                    row,
                    what: format!("feature {}", self.feature_names[j]),
                });
            }
            if !y.is_finite() {
                return Err(ModelError::NonFinite {
                    row,
                    what: "target".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Fit quality on a set of predictions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl ModelMetrics {
    pub fn regression(y_true: &[f64], y_pred: &[f64]) -> Self {
        let n = y_true.len().min(y_pred.len());
        if n == 0 {
            return Self {
                mse: 0.0,
                rmse: 0.0,
                mae: 0.0,
                r2: 0.0,
            };
        }
        let pairs = || y_true.iter().zip(y_pred.iter()).take(n);
        let mse = pairs().map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n as f64;
        let mae = pairs().map(|(t, p)| (t - p).abs()).sum::<f64>() / n as f64;

        let mean_true = y_true.iter().take(n).sum::<f64>() / n as f64;
        let ss_tot: f64 = y_true.iter().take(n).map(|t| (t - mean_true).powi(2)).sum();
        let ss_res = mse * n as f64;
        let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
        }
    }
}

/// Fitted boosted ensemble.
#[derive(Debug, Clone)]
pub struct GbmRegressor {
    base_score: f64,
    trees: Vec<RegressionTree>,
    feature_names: Vec<String>,
}

impl GbmRegressor {
    pub fn fit(dataset: &Dataset, params: &GbmParams) -> Result<Self, ModelError> {
        params.validate()?;
        dataset.validate()?;

        let n = dataset.len();
        let n_features = dataset.num_features();
        info!(
            samples = n,
            features = n_features,
            trees = params.n_estimators,
            max_depth = params.max_depth,
            "training gradient-boosted regressor"
        );

        let base_score = params
            .base_score
            .unwrap_or_else(|| dataset.targets.iter().sum::<f64>() / n as f64);
        let tree_params = params.tree_params();
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let mut preds = vec![base_score; n];
        let hess = vec![1.0; n];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            let grad: Vec<f64> = preds
                .iter()
                .zip(&dataset.targets)
                .map(|(p, y)| p - y)
                .collect();
            let rows = sample_rows(n, params.subsample, &mut rng);
            let cols = sample_cols(n_features, params.colsample_bytree, &mut rng);

            let tree =
                RegressionTree::grow(&dataset.features, &grad, &hess, &rows, &cols, &tree_params);
            for (p, x) in preds.iter_mut().zip(&dataset.features) {
                *p += tree.predict(x);
            }
            trees.push(tree);

            if (round + 1) % 50 == 0 {
                let m = ModelMetrics::regression(&dataset.targets, &preds);
                debug!(round = round + 1, rmse = m.rmse, "boosting progress");
            }
        }

        let max_depth = trees.iter().map(RegressionTree::depth).max().unwrap_or(0);
        let leaves: usize = trees.iter().map(RegressionTree::n_leaves).sum();
        info!(trees = trees.len(), max_depth, leaves, "boosting finished");

        Ok(Self {
            base_score,
            trees,
            feature_names: dataset.feature_names.clone(),
        })
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|x| self.predict(x)).collect()
    }

    #[cfg(test)]
    pub fn evaluate(&self, dataset: &Dataset) -> ModelMetrics {
        ModelMetrics::regression(&dataset.targets, &self.predict_batch(&dataset.features))
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

fn sample_rows(n: usize, ratio: f64, rng: &mut ChaCha8Rng) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let rows: Vec<usize> = (0..n).filter(|_| rng.gen::<f64>() < ratio).collect();
    if rows.is_empty() {
        vec![rng.gen_range(0..n)]
    } else {
        rows
    }
}

fn sample_cols(n: usize, ratio: f64, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut cols: Vec<usize> = (0..n).collect();
    if ratio >= 1.0 {
        return cols;
    }
    let keep = ((n as f64 * ratio).round() as usize).clamp(1, n);
    cols.shuffle(rng);
    cols.truncate(keep);
    cols.sort_unstable();
    cols
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    fn step_dataset() -> Dataset {
        let features: Vec<Vec<f64>> = (0..100)
            .map(|i| vec![f64::from(i), f64::from(i % 7)])
            .collect();
        let targets: Vec<f64> = (0..100)
            .map(|i| if i < 50 { 200.0 } else { 800.0 })
            .collect();
        Dataset::new(features, targets, names(2))
    }

    #[test]
    fn test_fit_reproduces_step_labels() {
        let data = step_dataset();
        let model = GbmRegressor::fit(&data, &GbmParams::default()).unwrap();
        assert_eq!(model.trees().len(), 200);
        assert!((model.base_score() - 500.0).abs() < 1e-9);
        for (x, y) in data.features.iter().zip(&data.targets) {
            assert!((model.predict(x) - y).abs() < 1.0);
        }
        let m = model.evaluate(&data);
        assert!(m.r2 > 0.999);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let data = step_dataset();
        let params = GbmParams {
            n_estimators: 20,
            subsample: 0.7,
            colsample_bytree: 0.5,
            ..GbmParams::default()
        };
        let a = GbmRegressor::fit(&data, &params).unwrap();
        let b = GbmRegressor::fit(&data, &params).unwrap();
        assert_eq!(a.trees(), b.trees());
        assert_eq!(a.predict_batch(&data.features), b.predict_batch(&data.features));
    }

    #[test]
    fn test_trees_respect_max_depth() {
        let data = step_dataset();
        let params = GbmParams {
            n_estimators: 5,
            max_depth: 2,
            ..GbmParams::default()
        };
        let model = GbmRegressor::fit(&data, &params).unwrap();
        assert!(model.trees().iter().all(|t| t.depth() <= 2));
    }

    #[test]
    fn test_single_row_predicts_its_label() {
        let data = Dataset::new(vec![vec![1.0, 2.0]], vec![500.0], names(2));
        let model = GbmRegressor::fit(&data, &GbmParams::default()).unwrap();
        assert!((model.predict(&[1.0, 2.0]) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let data = Dataset::new(vec![], vec![], names(3));
        assert!(matches!(
            GbmRegressor::fit(&data, &GbmParams::default()),
            Err(ModelError::EmptyDataset)
        ));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let data = Dataset::new(vec![vec![1.0, 2.0], vec![1.0]], vec![1.0, 2.0], names(2));
        assert!(matches!(
            GbmRegressor::fit(&data, &GbmParams::default()),
            Err(ModelError::DimensionMismatch { row: 1, .. })
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        let data = Dataset::new(vec![vec![f64::NAN, 2.0]], vec![1.0], names(2));
        assert!(matches!(
            GbmRegressor::fit(&data, &GbmParams::default()),
            Err(ModelError::NonFinite { row: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = GbmParams {
            subsample: 0.0,
            ..GbmParams::default()
        };
        assert!(matches!(
            GbmRegressor::fit(&step_dataset(), &params),
            Err(ModelError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_base_score_override() {
        let params = GbmParams {
            n_estimators: 0,
            base_score: Some(123.0),
            ..GbmParams::default()
        };
        let model = GbmRegressor::fit(&step_dataset(), &params).unwrap();
        assert!((model.predict(&[0.0, 0.0]) - 123.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_regression_metrics() {
        let m = ModelMetrics::regression(&[1.0, 2.0, 3.0], &[1.0, 2.0, 5.0]);
        assert!((m.mse - 4.0 / 3.0).abs() < 1e-12);
        assert!((m.mae - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.r2 - (1.0 - 4.0 / 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_column_sampling_keeps_at_least_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let cols = sample_cols(18, 0.01, &mut rng);
        assert_eq!(cols.len(), 1);
        let rows = sample_rows(10, 0.5, &mut rng);
        assert!(!rows.is_empty());
        assert!(rows.windows(2).all(|w| w[0] < w[1]));
    }
}
