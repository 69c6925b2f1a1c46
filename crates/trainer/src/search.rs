//! Randomized hyperparameter search with stratified k-fold cross-validation

use crate::booster::{BoostedModel, GbdtTrainer};
use crate::metrics;
use crate::params::HyperParams;
use hotel_core::errors::{PipelineError, Result, ResultExt, Stage};
use hotel_core::{Distribution, ParamValue, RandomSearchParams, Telemetry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// One sampled point of the search space
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub index: usize,
    pub sampled: BTreeMap<String, ParamValue>,
    pub params: HyperParams,
}

/// Cross-validated score of a candidate
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub index: usize,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// Result of a completed search, with the best candidate refit on all rows
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: Candidate,
    pub best_score: f64,
    pub scores: Vec<CandidateScore>,
    pub model: BoostedModel,
}

/// Train/validation row indices of one fold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

fn sample_value(dist: &Distribution, rng: &mut StdRng) -> ParamValue {
    match dist {
        Distribution::IntRange([low, high]) => ParamValue::Int(rng.gen_range(*low..*high)),
        Distribution::FloatRange([low, high]) => {
            ParamValue::Float(low + (high - low) * rng.gen::<f64>())
        }
        Distribution::Choice(values) => values[rng.gen_range(0..values.len())],
    }
}

/// Draw `n_iter` candidates from `space`, parameters in name order
pub fn sample_candidates(
    space: &BTreeMap<String, Distribution>,
    n_iter: usize,
    seed: u64,
    base: &HyperParams,
) -> Result<Vec<Candidate>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_iter)
        .map(|index| {
            let sampled: BTreeMap<String, ParamValue> = space
                .iter()
                .map(|(name, dist)| (name.clone(), sample_value(dist, &mut rng)))
                .collect();
            let params = base
                .with_overrides(&sampled)
                .map_err(|e| e.with_context("candidate", index))?;
            Ok(Candidate {
                index,
                sampled,
                params,
            })
        })
        .collect()
}

/// Stratified folds without shuffling
///
/// Rows of each class, in their original order, fill fold 0 first, then fold
/// 1, and so on; per-class fold sizes follow a round-robin deal of the
/// label-sorted rows, so every fold gets a near-equal share of each class.
pub fn stratified_k_fold(labels: &[f64], k: usize) -> Result<Vec<Fold>> {
    if k < 2 {
        return Err(PipelineError::new(
            Stage::Training,
            "build folds",
            "need at least two folds",
        )
        .with_context("cv", k));
    }

    let mut classes: Vec<f64> = labels.to_vec();
    classes.sort_by(f64::total_cmp);
    classes.dedup();
    let class_of: Vec<usize> = labels
        .iter()
        .map(|l| classes.partition_point(|c| c < l))
        .collect();

    let mut counts = vec![0usize; classes.len()];
    for &c in &class_of {
        counts[c] += 1;
    }
    if counts.iter().all(|&c| c < k) {
        return Err(PipelineError::new(
            Stage::Training,
            "build folds",
            "every class has fewer rows than folds",
        )
        .with_context("cv", k));
    }
    if let Some(&smallest) = counts.iter().min() {
        if smallest < k {
            warn!("The least populated class has only {} rows, fewer than cv={}", smallest, k);
        }
    }

    // allocation[fold][class]: class counts among sorted[fold], sorted[fold + k], ...
    let mut sorted = class_of.clone();
    sorted.sort_unstable();
    let mut allocation = vec![vec![0usize; classes.len()]; k];
    for (i, &c) in sorted.iter().enumerate() {
        allocation[i % k][c] += 1;
    }

    let mut fold_of = vec![0usize; labels.len()];
    for class in 0..classes.len() {
        let mut slots = (0..k).flat_map(|fold| std::iter::repeat(fold).take(allocation[fold][class]));
        for (row, _) in class_of.iter().enumerate().filter(|(_, &c)| c == class) {
            fold_of[row] = slots.next().unwrap_or(k - 1);
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (valid, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&row| fold_of[row] == fold);
            Fold { train, valid }
        })
        .collect())
}

fn gather<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| values[i].clone()).collect()
}

/// Randomized search over boosted-tree hyperparameters
pub struct RandomizedSearch {
    space: BTreeMap<String, Distribution>,
    settings: RandomSearchParams,
    telemetry: Telemetry,
}

impl RandomizedSearch {
    pub fn new(
        space: BTreeMap<String, Distribution>,
        settings: RandomSearchParams,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            space,
            settings,
            telemetry,
        }
    }

    /// Worker threads for candidate evaluation
    pub fn worker_count(&self) -> usize {
        if self.settings.n_jobs < 0 {
            num_cpus::get()
        } else {
            self.settings.n_jobs.max(1) as usize
        }
    }

    /// Score every candidate, pick the best mean and refit it on all rows
    pub fn fit(&self, rows: &[Vec<f64>], labels: &[f64]) -> Result<SearchOutcome> {
        let base = HyperParams::with_seed(self.settings.random_state);
        let candidates = sample_candidates(
            &self.space,
            self.settings.n_iter,
            self.settings.random_state,
            &base,
        )?;
        let folds = stratified_k_fold(labels, self.settings.cv)?;

        info!(
            "Fitting {} folds for each of {} candidates, totalling {} fits on {} workers",
            folds.len(),
            candidates.len(),
            folds.len() * candidates.len(),
            self.worker_count()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count())
            .build()
            .op(Stage::Training, "start search workers")?;

        let scores: Vec<CandidateScore> = pool.install(|| {
            candidates
                .par_iter()
                .map(|candidate| {
                    self.telemetry
                        .scope(|| self.evaluate(candidate, &folds, rows, labels))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        // First best wins ties; NaN never wins
        let mut best_index = 0;
        for score in &scores {
            if score.mean_score > scores[best_index].mean_score
                || scores[best_index].mean_score.is_nan()
            {
                best_index = score.index;
            }
        }
        let best = candidates[best_index].clone();
        let best_score = scores[best_index].mean_score;
        info!(
            "Best candidate {} scored {} {:.5} with {:?}",
            best.index, self.settings.scoring, best_score, best.sampled
        );

        let model = GbdtTrainer::new(best.params.clone()).fit(rows, labels)?;
        Ok(SearchOutcome {
            best,
            best_score,
            scores,
            model,
        })
    }

    fn evaluate(
        &self,
        candidate: &Candidate,
        folds: &[Fold],
        rows: &[Vec<f64>],
        labels: &[f64],
    ) -> Result<CandidateScore> {
        let trainer = GbdtTrainer::new(candidate.params.clone());
        let mut fold_scores = Vec::with_capacity(folds.len());

        for (i, fold) in folds.iter().enumerate() {
            let model = trainer
                .fit(&gather(rows, &fold.train), &gather(labels, &fold.train))
                .map_err(|e| e.with_context("candidate", candidate.index).with_context("fold", i))?;

            let y_true = gather(labels, &fold.valid);
            let proba: Vec<f64> = fold
                .valid
                .iter()
                .map(|&row| model.predict_proba(&rows[row]))
                .collect();
            let score = metrics::score(self.settings.scoring, &y_true, &proba);
            if self.settings.verbose >= 2 {
                info!(
                    "[CV {}/{}] candidate {}: {}={:.5}",
                    i + 1,
                    folds.len(),
                    candidate.index,
                    self.settings.scoring,
                    score
                );
            }
            fold_scores.push(score);
        }

        let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
        if self.settings.verbose >= 1 {
            info!(
                "Candidate {} {:?}: mean {}={:.5}",
                candidate.index, candidate.sampled, self.settings.scoring, mean_score
            );
        }
        Ok(CandidateScore {
            index: candidate.index,
            fold_scores,
            mean_score,
        })
    }
}
