//! Deterministic train/test split

use hotel_core::errors::{PipelineError, Result, Stage};
use hotel_core::DataFrame;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Seed of the split shuffle
pub const SPLIT_SEED: u64 = 42;

/// Number of training rows for `n` rows at `train_ratio`
pub fn train_size(n: usize, train_ratio: f64) -> usize {
    ((n as f64) * train_ratio).round() as usize
}

/// Shuffle row indices with `seed` and cut them at `round(n * train_ratio)`
///
/// Returns `(train, test)`; rows keep their shuffled order.
pub fn split_frame(
    frame: &DataFrame,
    train_ratio: f64,
    seed: u64,
) -> Result<(DataFrame, DataFrame)> {
    if !(train_ratio > 0.0 && train_ratio < 1.0) {
        return Err(PipelineError::new(
            Stage::Ingestion,
            "split data",
            "train_ratio must lie strictly between 0 and 1",
        )
        .with_context("train_ratio", train_ratio));
    }
    if frame.height() == 0 {
        return Err(PipelineError::new(
            Stage::Ingestion,
            "split data",
            "raw dataset has no rows",
        ));
    }

    let mut indices: Vec<usize> = (0..frame.height()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let cut = train_size(indices.len(), train_ratio);
    let (train_idx, test_idx) = indices.split_at(cut);
    Ok((frame.take_rows(train_idx), frame.take_rows(test_idx)))
}
