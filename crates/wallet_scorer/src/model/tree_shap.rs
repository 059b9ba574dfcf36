//! Exact path-dependent TreeSHAP.
//!
//! For every row, each feature receives its Shapley value with respect to the
//! ensemble's output, using node covers as the background distribution. The
//! values are additive: `expected_value + sum(phi) == predict(x)` up to
//! floating-point error.

use super::tree::RegressionTree;
use super::GbmRegressor;

/// Per-row, per-feature attributions for a batch of rows.
#[derive(Debug, Clone)]
pub struct ShapExplanation {
    /// Model output with no features known.
    pub expected_value: f64,
    /// `values[row][feature]`
    pub values: Vec<Vec<f64>>,
    pub feature_names: Vec<String>,
}

impl ShapExplanation {
    /// Mean absolute attribution per feature.
    pub fn mean_abs(&self) -> Vec<f64> {
        let n_features = self.feature_names.len();
        let mut totals = vec![0.0; n_features];
        for row in &self.values {
            for (t, v) in totals.iter_mut().zip(row) {
                *t += v.abs();
            }
        }
        let n = self.values.len().max(1) as f64;
        totals.into_iter().map(|t| t / n).collect()
    }

    /// Feature indices ordered by descending mean absolute attribution.
    pub fn ranking(&self) -> Vec<usize> {
        let importance = self.mean_abs();
        let mut order: Vec<usize> = (0..importance.len()).collect();
        order.sort_by(|&a, &b| importance[b].total_cmp(&importance[a]).then(a.cmp(&b)));
        order
    }
}

pub fn shap_values(model: &GbmRegressor, rows: &[Vec<f64>]) -> ShapExplanation {
    let n_features = model.feature_names().len();
    tracing::info!(rows = rows.len(), features = n_features, "computing SHAP values");

    let expected_value =
        model.base_score() + model.trees().iter().map(RegressionTree::expected_value).sum::<f64>();

    let values = rows
        .iter()
        .map(|x| {
            let mut phi = vec![0.0; n_features];
            for tree in model.trees() {
                tree_shap(tree, x, &mut phi);
            }
            phi
        })
        .collect();

    ShapExplanation {
        expected_value,
        values,
        feature_names: model.feature_names().to_vec(),
    }
}

/// Adds one tree's attributions for `x` into `phi`.
pub fn tree_shap(tree: &RegressionTree, x: &[f64], phi: &mut [f64]) {
    if tree.nodes.is_empty() {
        return;
    }
    recurse(tree, x, phi, 0, &[], 0, 1.0, 1.0, None);
}

#[derive(Debug, Clone, Copy, Default)]
struct PathElement {
    feature: Option<usize>,
    /// Fraction of paths flowing through when the feature is unknown.
    zero_fraction: f64,
    /// 1 if `x` follows this branch, 0 otherwise.
    one_fraction: f64,
    pweight: f64,
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &RegressionTree,
    x: &[f64],
    phi: &mut [f64],
    node_idx: usize,
    parent_path: &[PathElement],
    mut unique_depth: usize,
    parent_zero: f64,
    parent_one: f64,
    parent_feature: Option<usize>,
) {
    let mut path: Vec<PathElement> = parent_path[..unique_depth].to_vec();
    path.push(PathElement::default());
    extend_path(&mut path, unique_depth, parent_zero, parent_one, parent_feature);

    let node = &tree.nodes[node_idx];
    let Some(split) = node.split else {
        for i in 1..=unique_depth {
            let w = unwound_path_sum(&path, unique_depth, i);
            let el = path[i];
            if let Some(f) = el.feature {
                phi[f] += w * (el.one_fraction - el.zero_fraction) * node.value;
            }
        }
        return;
    };

    let (hot, cold) = if x[split.feature] < split.threshold {
        (split.left, split.right)
    } else {
        (split.right, split.left)
    };
    let hot_zero = tree.nodes[hot].cover / node.cover;
    let cold_zero = tree.nodes[cold].cover / node.cover;

    let mut incoming_zero = 1.0;
    let mut incoming_one = 1.0;
    if let Some(k) = (1..=unique_depth).find(|&k| path[k].feature == Some(split.feature)) {
        incoming_zero = path[k].zero_fraction;
        incoming_one = path[k].one_fraction;
        unwind_path(&mut path, unique_depth, k);
        unique_depth -= 1;
    }

    recurse(
        tree,
        x,
        phi,
        hot,
        &path,
        unique_depth + 1,
        hot_zero * incoming_zero,
        incoming_one,
        Some(split.feature),
    );
    recurse(
        tree,
        x,
        phi,
        cold,
        &path,
        unique_depth + 1,
        cold_zero * incoming_zero,
        0.0,
        Some(split.feature),
    );
}

fn extend_path(
    path: &mut [PathElement],
    unique_depth: usize,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    path[unique_depth] = PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if unique_depth == 0 { 1.0 } else { 0.0 },
    };
    let d = (unique_depth + 1) as f64;
    for i in (0..unique_depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / d;
        path[i].pweight = zero_fraction * path[i].pweight * (unique_depth - i) as f64 / d;
    }
}

/// Removes `path[path_index]`, undoing its `extend_path`.
fn unwind_path(path: &mut Vec<PathElement>, unique_depth: usize, path_index: usize) {
    let one = path[path_index].one_fraction;
    let zero = path[path_index].zero_fraction;
    let d = (unique_depth + 1) as f64;
    let mut next_one_portion = path[unique_depth].pweight;

    for i in (0..unique_depth).rev() {
        if one != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * d / ((i + 1) as f64 * one);
            next_one_portion = tmp - path[i].pweight * zero * (unique_depth - i) as f64 / d;
        } else {
            path[i].pweight = path[i].pweight * d / (zero * (unique_depth - i) as f64);
        }
    }

    for i in path_index..unique_depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.truncate(unique_depth);
}

/// Total permutation weight of the path with `path[path_index]` removed.
fn unwound_path_sum(path: &[PathElement], unique_depth: usize, path_index: usize) -> f64 {
    let one = path[path_index].one_fraction;
    let zero = path[path_index].zero_fraction;
    let d = (unique_depth + 1) as f64;
    let mut next_one_portion = path[unique_depth].pweight;
    let mut total = 0.0;

    for i in (0..unique_depth).rev() {
        if one != 0.0 {
            let tmp = next_one_portion * d / ((i + 1) as f64 * one);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero * (unique_depth - i) as f64 / d;
        } else if zero != 0.0 {
            total += path[i].pweight / zero / ((unique_depth - i) as f64 / d);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::super::tree::{Node, Split};
    use super::super::{Dataset, GbmParams};
    use super::*;

    fn leaf(value: f64, cover: f64) -> Node {
        Node {
            split: None,
            value,
            cover,
        }
    }

    fn internal(feature: usize, threshold: f64, left: usize, right: usize, cover: f64) -> Node {
        Node {
            split: Some(Split {
                feature,
                threshold,
                left,
                right,
            }),
            value: 0.0,
            cover,
        }
    }

    fn phi_of(tree: &RegressionTree, x: &[f64], n: usize) -> Vec<f64> {
        let mut phi = vec![0.0; n];
        tree_shap(tree, x, &mut phi);
        phi
    }

    #[test]
    fn test_single_split_attribution() {
        let (a, b) = (2.0, 10.0);
        let tree = RegressionTree {
            nodes: vec![internal(0, 0.5, 1, 2, 4.0), leaf(a, 1.0), leaf(b, 3.0)],
        };
        let e = (a + 3.0 * b) / 4.0;
        assert!((tree.expected_value() - e).abs() < 1e-12);

        let phi = phi_of(&tree, &[0.0, 7.0], 2);
        assert!((phi[0] - (a - e)).abs() < 1e-12);
        assert!(phi[1].abs() < 1e-12);

        let phi = phi_of(&tree, &[1.0, 7.0], 2);
        assert!((phi[0] - (b - e)).abs() < 1e-12);
    }

    #[test]
    fn test_and_tree_splits_credit_evenly() {
        // f = 1 only when both features are high; uniform covers.
        let tree = RegressionTree {
            nodes: vec![
                internal(0, 0.5, 1, 2, 4.0),
                internal(1, 0.5, 3, 4, 2.0),
                internal(1, 0.5, 5, 6, 2.0),
                leaf(0.0, 1.0),
                leaf(0.0, 1.0),
                leaf(0.0, 1.0),
                leaf(1.0, 1.0),
            ],
        };
        let phi = phi_of(&tree, &[1.0, 1.0], 2);
        assert!((phi[0] - 0.375).abs() < 1e-12);
        assert!((phi[1] - 0.375).abs() < 1e-12);

        let phi = phi_of(&tree, &[0.0, 0.0], 2);
        assert!((phi[0] + 0.125).abs() < 1e-12);
        assert!((phi[1] + 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_feature_on_path() {
        // Feature 0 is split twice; feature 1 never matters.
        let tree = RegressionTree {
            nodes: vec![
                internal(0, 5.0, 1, 2, 10.0),
                internal(0, 2.0, 3, 4, 5.0),
                leaf(9.0, 5.0),
                leaf(1.0, 2.0),
                leaf(4.0, 3.0),
            ],
        };
        let e = tree.expected_value();
        for x in [[0.0, 3.0], [3.0, -1.0], [8.0, 0.0]] {
            let phi = phi_of(&tree, &x, 2);
            assert!((phi[0] - (tree.predict(&x) - e)).abs() < 1e-12);
            assert!(phi[1].abs() < 1e-12);
        }
    }

    #[test]
    fn test_attributions_are_additive_on_fitted_model() {
        let features: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let i = f64::from(i);
                vec![i, (i * 7.0) % 11.0, (i * 3.0) % 5.0]
            })
            .collect();
        let targets: Vec<f64> = features
            .iter()
            .map(|x| if x[0] > 30.0 && x[1] > 4.0 { 800.0 } else { 200.0 + 20.0 * x[2] })
            .collect();
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let data = Dataset::new(features.clone(), targets, names);
        let params = GbmParams {
            n_estimators: 30,
            subsample: 0.8,
            colsample_bytree: 0.67,
            ..GbmParams::default()
        };
        let model = GbmRegressor::fit(&data, &params).unwrap();

        let explanation = shap_values(&model, &features);
        assert_eq!(explanation.values.len(), features.len());
        for (x, phi) in features.iter().zip(&explanation.values) {
            let total = explanation.expected_value + phi.iter().sum::<f64>();
            assert!(
                (total - model.predict(x)).abs() < 1e-6,
                "{total} vs {}",
                model.predict(x)
            );
        }
    }

    #[test]
    fn test_ranking_orders_by_mean_abs() {
        let explanation = ShapExplanation {
            expected_value: 0.0,
            values: vec![vec![0.1, -3.0, 1.0], vec![-0.1, 1.0, -1.0]],
            feature_names: vec!["a".into(), "b".into(), "c".into()],
        };
        let m = explanation.mean_abs();
        assert!((m[1] - 2.0).abs() < 1e-12);
        assert_eq!(explanation.ranking(), vec![1, 2, 0]);
    }
}
