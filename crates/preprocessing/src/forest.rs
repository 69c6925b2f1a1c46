//! Random forest classifier used to rank features
//!
//! Bootstrap-sampled Gini trees grown on quantised features, `sqrt(p)`
//! candidate features per split. Feature importance is the mean decrease in
//! impurity: each tree's impurity decreases are normalised to sum to 1, then
//! averaged over the forest.

use hotel_core::errors::{PipelineError, Result, Stage};
use hotel_core::tree::{BinnedMatrix, Node, SplitCandidate, Tree};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Forest training parameters
#[derive(Clone, Debug)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub max_bin: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            max_bin: 255,
            seed: 42,
        }
    }
}

/// Fitted forest
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Tree>,
    importances: Vec<f64>,
    n_classes: usize,
}

/// Grows one Gini tree over a bootstrap sample
struct GiniTreeBuilder<'a> {
    data: &'a BinnedMatrix,
    labels: &'a [usize],
    n_classes: usize,
    max_features: usize,
    config: &'a ForestConfig,
    rng: StdRng,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

/// `n * gini` for a class histogram holding `n` rows
fn weighted_gini(counts: &[usize]) -> f64 {
    let n: usize = counts.iter().sum();
    if n == 0 {
        return 0.0;
    }
    let sum_sq: f64 = counts.iter().map(|&c| (c * c) as f64).sum();
    n as f64 - sum_sq / n as f64
}

fn majority_class(counts: &[usize]) -> usize {
    let mut best = 0;
    for (class, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = class;
        }
    }
    best
}

impl<'a> GiniTreeBuilder<'a> {
    fn class_counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &row in rows {
            counts[self.labels[row]] += 1;
        }
        counts
    }

    fn build(mut self, rows: Vec<usize>) -> (Tree, Vec<f64>) {
        self.build_node(rows, 0);
        (Tree::new(self.nodes), self.importances)
    }

    fn build_node(&mut self, rows: Vec<usize>, depth: usize) -> i32 {
        let id = self.nodes.len() as i32;
        let counts = self.class_counts(&rows);
        let leaf_value = majority_class(&counts) as f64;

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.config.max_depth.is_some_and(|max| depth >= max);
        if pure || depth_reached || rows.len() < self.config.min_samples_split {
            self.nodes.push(Node::leaf(id, leaf_value));
            return id;
        }

        let Some(split) = self.find_best_split(&rows, &counts) else {
            self.nodes.push(Node::leaf(id, leaf_value));
            return id;
        };

        let column = self.data.column(split.feature);
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&row| column[row] <= split.bin);

        self.importances[split.feature] += split.gain;

        // Reserve the slot, children are filled in once built
        let threshold = self.data.threshold(split.feature, split.bin);
        self.nodes
            .push(Node::internal(id, split.feature as i32, threshold, -1, -1));
        let left_id = self.build_node(left, depth + 1);
        let right_id = self.build_node(right, depth + 1);
        self.nodes[id as usize].left = left_id;
        self.nodes[id as usize].right = right_id;
        id
    }

    fn find_best_split(&mut self, rows: &[usize], parent: &[usize]) -> Option<SplitCandidate> {
        let n_features = self.data.n_features();
        let mut features =
            rand::seq::index::sample(&mut self.rng, n_features, self.max_features).into_vec();
        features.sort_unstable();

        let parent_impurity = weighted_gini(parent);
        let mut best: Option<SplitCandidate> = None;

        for feature in features {
            let n_bins = self.data.n_bins(feature);
            if n_bins < 2 {
                continue;
            }
            let column = self.data.column(feature);
            let mut histogram = vec![vec![0usize; self.n_classes]; n_bins];
            for &row in rows {
                histogram[column[row] as usize][self.labels[row]] += 1;
            }

            let mut left = vec![0usize; self.n_classes];
            let mut right = parent.to_vec();
            for (bin, bin_counts) in histogram.iter().enumerate().take(n_bins - 1) {
                for (class, &count) in bin_counts.iter().enumerate() {
                    left[class] += count;
                    right[class] -= count;
                }
                let n_left: usize = left.iter().sum();
                if n_left == 0 || n_left == rows.len() {
                    continue;
                }

                let gain = parent_impurity - weighted_gini(&left) - weighted_gini(&right);
                if gain <= 1e-12 {
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
}

fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
}

impl RandomForest {
    /// Fit on row-major `rows` with class indices `labels` (`0..n_classes`)
    pub fn fit(rows: &[Vec<f64>], labels: &[usize], config: &ForestConfig) -> Result<Self> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(PipelineError::new(
                Stage::Preprocessing,
                "fit feature importance forest",
                "need a non-empty training set with one label per row",
            )
            .with_context("rows", rows.len())
            .with_context("labels", labels.len()));
        }
        if config.n_trees == 0 {
            return Err(PipelineError::new(
                Stage::Preprocessing,
                "fit feature importance forest",
                "forest needs at least one tree",
            ));
        }

        let data = BinnedMatrix::from_rows(rows, config.max_bin);
        let n_features = data.n_features();
        let n_classes = labels.iter().max().map_or(0, |m| m + 1);
        let max_features = ((n_features as f64).sqrt() as usize).clamp(1, n_features.max(1));

        // Per-tree seeds drawn up front so results do not depend on scheduling
        let mut seeder = StdRng::seed_from_u64(config.seed);
        let seeds: Vec<u64> = (0..config.n_trees).map(|_| seeder.gen()).collect();

        let grown: Vec<(Tree, Vec<f64>)> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let n = data.n_rows();
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let builder = GiniTreeBuilder {
                    data: &data,
                    labels,
                    n_classes,
                    max_features,
                    config,
                    rng,
                    nodes: Vec::new(),
                    importances: vec![0.0; n_features],
                };
                builder.build(sample)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, mut tree_importances) in grown {
            normalize(&mut tree_importances);
            for (total, value) in importances.iter_mut().zip(&tree_importances) {
                *total += value;
            }
            trees.push(tree);
        }
        normalize(&mut importances);

        Ok(Self {
            trees,
            importances,
            n_classes,
        })
    }

    /// Mean decrease in impurity per feature, summing to 1
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Majority vote over the trees
    pub fn predict(&self, row: &[f64]) -> usize {
        let mut votes = vec![0usize; self.n_classes.max(1)];
        for tree in &self.trees {
            let class = tree.predict(row) as usize;
            if class < votes.len() {
                votes[class] += 1;
            }
        }
        majority_class(&votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    /// Label depends on feature 1 only; features 0 and 2 are noise
    fn signal_data() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(7);
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for _ in 0..400 {
            let signal: f64 = rng.gen_range(0.0..10.0);
            rows.push(vec![rng.gen_range(0.0..10.0), signal, rng.gen_range(0.0..10.0)]);
            labels.push(usize::from(signal > 6.0));
        }
        (rows, labels)
    }

    #[test]
    fn test_informative_feature_ranks_first() -> Result<()> {
        let (rows, labels) = signal_data();
        let config = ForestConfig {
            n_trees: 25,
            ..Default::default()
        };
        let forest = RandomForest::fit(&rows, &labels, &config)?;
        let imp = forest.feature_importances();

        assert_eq!(imp.len(), 3);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[1] > imp[0] && imp[1] > imp[2], "importances: {imp:?}");
        Ok(())
    }

    #[test]
    fn test_forest_is_deterministic_and_fits() -> Result<()> {
        let (rows, labels) = signal_data();
        let config = ForestConfig {
            n_trees: 10,
            ..Default::default()
        };
        let a = RandomForest::fit(&rows, &labels, &config)?;
        let b = RandomForest::fit(&rows, &labels, &config)?;
        assert_eq!(a.feature_importances(), b.feature_importances());
        assert_eq!(a.trees(), b.trees());

        let correct = rows
            .iter()
            .zip(&labels)
            .filter(|(row, &label)| a.predict(row) == label)
            .count();
        assert!(correct as f64 / rows.len() as f64 > 0.95);
        for tree in a.trees() {
            assert!(tree.validate().is_ok());
        }
        Ok(())
    }

    #[test]
    fn test_gini_helpers() {
        assert_eq!(weighted_gini(&[5, 0]), 0.0);
        assert!((weighted_gini(&[2, 2]) - 2.0).abs() < 1e-12);
        assert_eq!(majority_class(&[3, 3, 1]), 0);
        assert_eq!(majority_class(&[1, 4]), 1);
    }
}
