//! Gradient boosted decision trees for binary classification
//!
//! Logistic loss, histogram split finding over quantised features and
//! leaf-wise (best-first) growth: the leaf with the largest split gain is split
//! next until `num_leaves` is reached or no leaf can be split.

use crate::params::HyperParams;
use hotel_core::errors::{PipelineError, Result, Stage};
use hotel_core::tree::{BinnedMatrix, Node, SplitCandidate, Tree};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Smallest hessian sum a child may carry
const MIN_CHILD_HESSIAN: f64 = 1e-3;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fitted boosted ensemble
///
/// Leaf values already include the learning rate; the raw score of a row is
/// `bias + sum(tree outputs)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedModel {
    pub bias: f64,
    pub trees: Vec<Tree>,
}

impl BoostedModel {
    /// Log-odds for one feature row
    pub fn raw_score(&self, features: &[f64]) -> f64 {
        self.bias + self.trees.iter().map(|t| t.predict(features)).sum::<f64>()
    }

    /// Probability of class 1
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.raw_score(features))
    }

    /// Class label, 1 when the probability is at least 0.5
    pub fn predict(&self, features: &[f64]) -> f64 {
        if self.predict_proba(features) >= 0.5 {
            1.0
        } else {
            0.0
        }
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.bias.is_finite() {
            return Err(format!("bias is not finite: {}", self.bias));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|e| format!("Tree {i} validation failed: {e}"))?;
        }
        Ok(())
    }
}

/// Gradient statistics of a set of rows
#[derive(Debug, Clone, Copy, Default)]
struct GradStats {
    grad: f64,
    hess: f64,
    count: usize,
}

impl GradStats {
    fn add(&mut self, g: f64, h: f64) {
        self.grad += g;
        self.hess += h;
        self.count += 1;
    }

    fn minus(&self, other: &GradStats) -> GradStats {
        GradStats {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count - other.count,
        }
    }

    fn score(&self, lambda: f64) -> f64 {
        self.grad * self.grad / (self.hess + lambda)
    }
}

/// A leaf waiting to be split
struct OpenLeaf {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    stats: GradStats,
    split: Option<SplitCandidate>,
}

/// Grows one regression tree on gradients, leaf-wise
struct LeafWiseBuilder<'a> {
    data: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    params: &'a HyperParams,
}

impl<'a> LeafWiseBuilder<'a> {
    fn stats(&self, rows: &[usize]) -> GradStats {
        let mut stats = GradStats::default();
        for &row in rows {
            stats.add(self.grad[row], self.hess[row]);
        }
        stats
    }

    fn can_split(&self, depth: usize, stats: &GradStats) -> bool {
        let depth_ok = self.params.depth_limit().map_or(true, |max| depth < max);
        depth_ok && stats.count >= 2 * self.params.min_child_samples
    }

    fn find_best_split(&self, rows: &[usize], parent: &GradStats) -> Option<SplitCandidate> {
        let lambda = self.params.reg_lambda;
        let min_child = self.params.min_child_samples;
        let parent_score = parent.score(lambda);
        let mut best: Option<SplitCandidate> = None;

        for &feature in self.features {
            let n_bins = self.data.n_bins(feature);
            if n_bins < 2 {
                continue;
            }
            let column = self.data.column(feature);
            let mut histogram = vec![GradStats::default(); n_bins];
            for &row in rows {
                histogram[column[row] as usize].add(self.grad[row], self.hess[row]);
            }

            let mut left = GradStats::default();
            for (bin, bin_stats) in histogram.iter().enumerate().take(n_bins - 1) {
                left.grad += bin_stats.grad;
                left.hess += bin_stats.hess;
                left.count += bin_stats.count;
                let right = parent.minus(&left);

                if left.count < min_child || right.count < min_child {
                    continue;
                }
                if left.hess < MIN_CHILD_HESSIAN || right.hess < MIN_CHILD_HESSIAN {
                    continue;
                }

                let gain = left.score(lambda) + right.score(lambda) - parent_score;
                if gain <= 0.0 {
                    continue;
                }
                let candidate = SplitCandidate {
                    feature,
                    bin: bin as u16,
                    gain,
                };
                if candidate.beats(best.as_ref()) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    fn open_leaf(&self, node: usize, rows: Vec<usize>, depth: usize) -> OpenLeaf {
        let stats = self.stats(&rows);
        let split = if self.can_split(depth, &stats) {
            self.find_best_split(&rows, &stats)
        } else {
            None
        };
        OpenLeaf {
            node,
            rows,
            depth,
            stats,
            split,
        }
    }

    fn leaf_value(&self, stats: &GradStats) -> f64 {
        let denom = stats.hess + self.params.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -stats.grad / denom * self.params.learning_rate
    }

    fn build(&self, rows: Vec<usize>) -> Tree {
        let mut nodes = vec![Node::leaf(0, 0.0)];
        let mut leaves = vec![self.open_leaf(0, rows, 0)];

        while leaves.len() < self.params.num_leaves {
            // Largest gain first; earlier leaves win ties
            let mut chosen: Option<usize> = None;
            for (i, leaf) in leaves.iter().enumerate() {
                let Some(split) = &leaf.split else { continue };
                let better = match chosen.and_then(|c| leaves[c].split.as_ref()) {
                    None => true,
                    Some(current) => split.gain > current.gain,
                };
                if better {
                    chosen = Some(i);
                }
            }
            let Some(index) = chosen else { break };

            let leaf = leaves.remove(index);
            let Some(split) = leaf.split else { break };
            let column = self.data.column(split.feature);
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                leaf.rows.into_iter().partition(|&row| column[row] <= split.bin);

            let left_id = nodes.len();
            let right_id = left_id + 1;
            nodes.push(Node::leaf(left_id as i32, 0.0));
            nodes.push(Node::leaf(right_id as i32, 0.0));
            nodes[leaf.node] = Node::internal(
                leaf.node as i32,
                split.feature as i32,
                self.data.threshold(split.feature, split.bin),
                left_id as i32,
                right_id as i32,
            );

            leaves.push(self.open_leaf(left_id, left_rows, leaf.depth + 1));
            leaves.push(self.open_leaf(right_id, right_rows, leaf.depth + 1));
        }

        for leaf in &leaves {
            nodes[leaf.node] = Node::leaf(leaf.node as i32, self.leaf_value(&leaf.stats));
        }
        Tree::new(nodes)
    }
}

/// Boosted classifier trainer
pub struct GbdtTrainer {
    params: HyperParams,
}

impl GbdtTrainer {
    pub fn new(params: HyperParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &HyperParams {
        &self.params
    }

    /// Fit on row-major features and 0/1 labels
    pub fn fit(&self, rows: &[Vec<f64>], labels: &[f64]) -> Result<BoostedModel> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(PipelineError::new(
                Stage::Training,
                "train model",
                "need a non-empty training set with one label per row",
            )
            .with_context("rows", rows.len())
            .with_context("labels", labels.len()));
        }
        if let Some(row) = labels.iter().position(|&l| l != 0.0 && l != 1.0) {
            return Err(PipelineError::new(
                Stage::Training,
                "train model",
                "labels must be 0 or 1",
            )
            .with_context("row", row)
            .with_context("label", labels[row]));
        }

        let n = rows.len();
        let data = BinnedMatrix::from_rows(rows, self.params.max_bin);
        let n_features = data.n_features();

        let positive_rate = (labels.iter().sum::<f64>() / n as f64).clamp(1e-15, 1.0 - 1e-15);
        let bias = (positive_rate / (1.0 - positive_rate)).ln();
        let mut scores = vec![bias; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];

        let mut rng = StdRng::seed_from_u64(self.params.random_state);
        let n_cols = ((self.params.colsample_bytree * n_features as f64).round() as usize)
            .clamp(1, n_features.max(1));

        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for round in 0..self.params.n_estimators {
            for i in 0..n {
                let p = sigmoid(scores[i]);
                grad[i] = p - labels[i];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let mut sample: Vec<usize> = if self.params.subsample < 1.0 {
                (0..n)
                    .filter(|_| rng.gen::<f64>() < self.params.subsample)
                    .collect()
            } else {
                (0..n).collect()
            };
            if sample.is_empty() {
                sample = (0..n).collect();
            }

            let mut features = if n_cols < n_features {
                rand::seq::index::sample(&mut rng, n_features, n_cols).into_vec()
            } else {
                (0..n_features).collect()
            };
            features.sort_unstable();

            let builder = LeafWiseBuilder {
                data: &data,
                grad: &grad,
                hess: &hess,
                features: &features,
                params: &self.params,
            };
            let tree = builder.build(sample);

            for (score, row) in scores.iter_mut().zip(rows) {
                *score += tree.predict(row);
            }
            if round % 25 == 0 {
                debug!("Boosting round {}: {} leaves", round + 1, tree.leaf_count());
            }
            trees.push(tree);
        }

        Ok(BoostedModel { bias, trees })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn two_blobs(n: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut rows = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let label = (i % 2) as f64;
            let center = if label == 1.0 { 3.0 } else { 0.0 };
            rows.push(vec![
                center + rng.gen_range(-1.0..1.0),
                rng.gen_range(0.0..5.0),
            ]);
            labels.push(label);
        }
        (rows, labels)
    }

    fn small_params() -> HyperParams {
        HyperParams {
            n_estimators: 20,
            num_leaves: 8,
            min_child_samples: 5,
            ..HyperParams::default()
        }
    }

    #[test]
    fn test_booster_separates_blobs() -> Result<()> {
        let (rows, labels) = two_blobs(300, 1);
        let model = GbdtTrainer::new(small_params()).fit(&rows, &labels)?;

        assert_eq!(model.num_trees(), 20);
        assert!(model.validate().is_ok());
        let correct = rows
            .iter()
            .zip(&labels)
            .filter(|(row, &label)| model.predict(row) == label)
            .count();
        assert!(correct as f64 / rows.len() as f64 > 0.95);
        for tree in &model.trees {
            assert!(tree.leaf_count() <= 8);
        }
        Ok(())
    }

    #[test]
    fn test_bias_is_log_odds_of_positive_rate() -> Result<()> {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let labels: Vec<f64> = (0..40).map(|i| if i < 10 { 1.0 } else { 0.0 }).collect();
        let params = HyperParams {
            n_estimators: 1,
            ..HyperParams::default()
        };
        let model = GbdtTrainer::new(params).fit(&rows, &labels)?;
        assert!((model.bias - (0.25f64 / 0.75).ln()).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_depth_and_leaf_limits() -> Result<()> {
        let (rows, labels) = two_blobs(400, 2);
        let params = HyperParams {
            n_estimators: 5,
            num_leaves: 31,
            max_depth: 2,
            min_child_samples: 1,
            ..HyperParams::default()
        };
        let model = GbdtTrainer::new(params).fit(&rows, &labels)?;
        for tree in &model.trees {
            assert!(tree.depth() <= 2);
            assert!(tree.leaf_count() <= 4);
        }
        Ok(())
    }

    #[test]
    fn test_subsampled_training_is_deterministic() -> Result<()> {
        let (rows, labels) = two_blobs(200, 3);
        let params = HyperParams {
            subsample: 0.7,
            colsample_bytree: 0.5,
            ..small_params()
        };
        let a = GbdtTrainer::new(params.clone()).fit(&rows, &labels)?;
        let b = GbdtTrainer::new(params).fit(&rows, &labels)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let err = GbdtTrainer::new(HyperParams::default())
            .fit(&[vec![1.0], vec![2.0]], &[0.0, 2.0])
            .unwrap_err();
        assert_eq!(err.context_value("row"), Some("1"));
    }
}
