//! Regression tree grown on second-order gradient statistics.

/// Split candidates must improve the objective by more than this.
const MIN_SPLIT_GAIN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Split {
    pub feature: usize,
    /// Rows with `x[feature] < threshold` go left.
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub split: Option<Split>,
    /// Leaf weight (already scaled by the learning rate); unused on internal nodes.
    pub value: f64,
    /// Hessian sum of the training rows reaching this node.
    pub cover: f64,
}

/// Flat node arena; the root is `nodes[0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub learning_rate: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
}

impl RegressionTree {
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            match node.split {
                Some(s) => idx = if x[s.feature] < s.threshold { s.left } else { s.right },
                None => return node.value,
            }
        }
    }

    /// Cover-weighted mean leaf value: the tree's output with no features known.
    pub fn expected_value(&self) -> f64 {
        self.expected_from(0)
    }

    fn expected_from(&self, idx: usize) -> f64 {
        let node = &self.nodes[idx];
        match node.split {
            None => node.value,
            Some(s) => {
                let l = &self.nodes[s.left];
                let r = &self.nodes[s.right];
                (l.cover * self.expected_from(s.left) + r.cover * self.expected_from(s.right))
                    / node.cover
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.depth_from(0)
    }

    fn depth_from(&self, idx: usize) -> usize {
        match self.nodes[idx].split {
            None => 0,
            Some(s) => 1 + self.depth_from(s.left).max(self.depth_from(s.right)),
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.split.is_none()).count()
    }

    /// Grow one tree on `rows` using only the feature indices in `cols`.
    pub fn grow(
        features: &[Vec<f64>],
        grad: &[f64],
        hess: &[f64],
        rows: &[usize],
        cols: &[usize],
        params: &TreeParams,
    ) -> Self {
        let mut builder = TreeBuilder {
            features,
            grad,
            hess,
            cols,
            params,
            nodes: Vec::new(),
        };
        builder.build(rows, 0);
        Self {
            nodes: builder.nodes,
        }
    }
}

struct TreeBuilder<'a> {
    features: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    cols: &'a [usize],
    params: &'a TreeParams,
    nodes: Vec<Node>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn build(&mut self, rows: &[usize], depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| self.hess[r]).sum();

        let idx = self.nodes.len();
        self.nodes.push(Node {
            split: None,
            value: -g / (h + self.params.reg_lambda) * self.params.learning_rate,
            cover: h,
        });

        if depth >= self.params.max_depth {
            return idx;
        }
        let Some(best) = self.best_split(rows, g, h) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| self.features[r][best.feature] < best.threshold);
        let left = self.build(&left_rows, depth + 1);
        let right = self.build(&right_rows, depth + 1);
        self.nodes[idx].split = Some(Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        });
        idx
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.reg_lambda)
    }

    /// Exact greedy search over every distinct value boundary.
    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<Candidate> {
        let parent = self.score(g, h);
        let mcw = self.params.min_child_weight;
        let mut best: Option<Candidate> = None;

        for &feature in self.cols {
            let mut sorted: Vec<(f64, f64, f64)> = rows
                .iter()
                .map(|&r| (self.features[r][feature], self.grad[r], self.hess[r]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (mut gl, mut hl) = (0.0, 0.0);
            for i in 0..sorted.len().saturating_sub(1) {
                gl += sorted[i].1;
                hl += sorted[i].2;
                let (v, next) = (sorted[i].0, sorted[i + 1].0);
                if v >= next {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < mcw || hr < mcw {
                    continue;
                }
                let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent)
                    - self.params.gamma;
                let beats = best.as_ref().map_or(gain > MIN_SPLIT_GAIN, |b| gain > b.gain);
                if beats {
                    best = Some(Candidate {
                        feature,
                        threshold: midpoint(v, next),
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Midpoint that still separates `lo` from `hi` for adjacent floats.
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid > lo && mid <= hi {
        mid
    } else {
        hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_depth: usize) -> TreeParams {
        TreeParams {
            max_depth,
            learning_rate: 1.0,
            reg_lambda: 0.0,
            gamma: 0.0,
            min_child_weight: 1.0,
        }
    }

    /// Gradients for predicting `y` from a zero prediction.
    fn grads(y: &[f64]) -> (Vec<f64>, Vec<f64>) {
        (y.iter().map(|v| -v).collect(), vec![1.0; y.len()])
    }

    #[test]
    fn test_single_split_recovers_step_function() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i)]).collect();
        let y: Vec<f64> = (0..10).map(|i| if i < 4 { 1.0 } else { 5.0 }).collect();
        let (g, h) = grads(&y);
        let rows: Vec<usize> = (0..10).collect();
        let tree = RegressionTree::grow(&x, &g, &h, &rows, &[0], &params(1));

        assert_eq!(tree.nodes.len(), 3);
        let split = tree.nodes[0].split.unwrap();
        assert_eq!(split.feature, 0);
        assert!((split.threshold - 3.5).abs() < 1e-12);
        assert!((tree.predict(&[2.0]) - 1.0).abs() < 1e-12);
        assert!((tree.predict(&[7.0]) - 5.0).abs() < 1e-12);
        assert!((tree.nodes[0].cover - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_constant_target_does_not_split() {
        let x: Vec<Vec<f64>> = (0..5).map(|i| vec![f64::from(i)]).collect();
        let (g, h) = grads(&[2.0; 5]);
        let rows: Vec<usize> = (0..5).collect();
        let tree = RegressionTree::grow(&x, &g, &h, &rows, &[0], &params(4));
        assert_eq!(tree.nodes.len(), 1);
        assert!((tree.predict(&[100.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_depth_is_bounded() {
        let x: Vec<Vec<f64>> = (0..64).map(|i| vec![f64::from(i)]).collect();
        let y: Vec<f64> = (0..64).map(|i| f64::from(i * i % 17)).collect();
        let (g, h) = grads(&y);
        let rows: Vec<usize> = (0..64).collect();
        let tree = RegressionTree::grow(&x, &g, &h, &rows, &[0], &params(3));
        assert!(tree.depth() <= 3);
        assert!(tree.n_leaves() <= 8);
    }

    #[test]
    fn test_expected_value_is_cover_weighted() {
        let x: Vec<Vec<f64>> = (0..4).map(|i| vec![f64::from(i)]).collect();
        let y = [0.0, 4.0, 4.0, 4.0];
        let (g, h) = grads(&y);
        let rows: Vec<usize> = (0..4).collect();
        let tree = RegressionTree::grow(&x, &g, &h, &rows, &[0], &params(1));
        assert!((tree.expected_value() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_min_child_weight_blocks_tiny_leaves() {
        let x: Vec<Vec<f64>> = (0..4).map(|i| vec![f64::from(i)]).collect();
        let y = [0.0, 0.0, 0.0, 9.0];
        let (g, h) = grads(&y);
        let rows: Vec<usize> = (0..4).collect();
        let p = TreeParams {
            min_child_weight: 2.0,
            ..params(1)
        };
        let tree = RegressionTree::grow(&x, &g, &h, &rows, &[0], &p);
        let split = tree.nodes[0].split.unwrap();
        // The only legal boundary leaves two rows on each side.
        assert!((split.threshold - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_unused_columns_are_ignored() {
        let x: Vec<Vec<f64>> = (0..6).map(|i| vec![f64::from(i), f64::from(i % 2)]).collect();
        let y: Vec<f64> = (0..6).map(|i| f64::from(i % 2) * 10.0).collect();
        let (g, h) = grads(&y);
        let rows: Vec<usize> = (0..6).collect();
        let tree = RegressionTree::grow(&x, &g, &h, &rows, &[0], &params(1));
        if let Some(split) = tree.nodes[0].split {
            assert_eq!(split.feature, 0);
        }
    }

    #[test]
    fn test_midpoint_of_adjacent_floats() {
        let lo = 1.0_f64;
        let hi = f64::from_bits(lo.to_bits() + 1);
        let t = midpoint(lo, hi);
        assert!(lo < t);
        assert!(t <= hi);
    }
}
