//! SMOTE oversampling
//!
//! Every class below the majority count gets synthetic rows interpolated
//! between one of its rows and one of that row's `k` nearest same-class
//! neighbours (Euclidean), until all classes have the majority count. Sampling
//! draws all base/neighbour picks first, then all interpolation steps, from a
//! single seeded generator.

use hotel_core::errors::{PipelineError, Result, Stage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

/// Oversampler configuration
#[derive(Debug, Clone, Copy)]
pub struct Smote {
    pub k_neighbors: usize,
    pub seed: u64,
}

impl Default for Smote {
    fn default() -> Self {
        Self {
            k_neighbors: 5,
            seed: 42,
        }
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Indices (into `members`) of the `k` nearest neighbours of each member
fn nearest_neighbors(features: &[Vec<f64>], members: &[usize], k: usize) -> Vec<Vec<usize>> {
    members
        .par_iter()
        .enumerate()
        .map(|(i, &row)| {
            let mut distances: Vec<(f64, usize)> = members
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, &other)| (squared_distance(&features[row], &features[other]), j))
                .collect();
            distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            distances.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

impl Smote {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self { k_neighbors, seed }
    }

    /// Balance `labels` by appending synthetic rows
    ///
    /// Original rows come first, in order; synthetic rows follow class by
    /// class in ascending label order.
    pub fn fit_resample(
        &self,
        features: &[Vec<f64>],
        labels: &[f64],
    ) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
        if features.len() != labels.len() {
            return Err(PipelineError::new(
                Stage::Preprocessing,
                "balance classes",
                "feature and label row counts differ",
            )
            .with_context("features", features.len())
            .with_context("labels", labels.len()));
        }
        if let Some(row) = features.iter().position(|r| r.iter().any(|v| v.is_nan())) {
            return Err(PipelineError::new(
                Stage::Preprocessing,
                "balance classes",
                "feature rows must not contain missing values",
            )
            .with_context("row", row));
        }
        if let Some(row) = labels.iter().position(|v| v.is_nan()) {
            return Err(PipelineError::new(
                Stage::Preprocessing,
                "balance classes",
                "label is missing",
            )
            .with_context("row", row));
        }

        let mut classes: Vec<f64> = labels.to_vec();
        classes.sort_by(f64::total_cmp);
        classes.dedup();

        let members: Vec<Vec<usize>> = classes
            .iter()
            .map(|&class| (0..labels.len()).filter(|&i| labels[i] == class).collect())
            .collect();
        let majority = members.iter().map(Vec::len).max().unwrap_or(0);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut out_features = features.to_vec();
        let mut out_labels = labels.to_vec();

        for (class, rows) in classes.iter().zip(&members) {
            let needed = majority - rows.len();
            if needed == 0 {
                continue;
            }
            debug!("Class {}: {} rows, synthesising {}", class, rows.len(), needed);

            let k = self.k_neighbors.min(rows.len() - 1);
            if k == 0 {
                // A lone row has no neighbours to interpolate towards
                for _ in 0..needed {
                    out_features.push(features[rows[0]].clone());
                    out_labels.push(*class);
                }
                continue;
            }

            let neighbors = nearest_neighbors(features, rows, k);
            let picks: Vec<usize> = (0..needed).map(|_| rng.gen_range(0..rows.len() * k)).collect();
            let steps: Vec<f64> = (0..needed).map(|_| rng.gen::<f64>()).collect();

            for (pick, step) in picks.into_iter().zip(steps) {
                let base = &features[rows[pick / k]];
                let neighbor = &features[rows[neighbors[pick / k][pick % k]]];
                let synthetic = base
                    .iter()
                    .zip(neighbor)
                    .map(|(x, nn)| x + step * (nn - x))
                    .collect();
                out_features.push(synthetic);
                out_labels.push(*class);
            }
        }

        info!(
            "Oversampled {} rows to {} across {} classes",
            labels.len(),
            out_labels.len(),
            classes.len()
        );
        Ok((out_features, out_labels))
    }
}
