//! Binary classification metrics, positive class 1
//!
//! Ratios with a zero denominator evaluate to 0.

use hotel_core::Scoring;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Confusion {
    tp: usize,
    fp: usize,
    tn: usize,
    fn_: usize,
}

impl Confusion {
    fn from_labels(y_true: &[f64], y_pred: &[f64]) -> Self {
        let mut c = Confusion::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == 1.0, p == 1.0) {
                (true, true) => c.tp += 1,
                (false, true) => c.fp += 1,
                (false, false) => c.tn += 1,
                (true, false) => c.fn_ += 1,
            }
        }
        c
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn accuracy(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let c = Confusion::from_labels(y_true, y_pred);
    ratio(c.tp + c.tn, y_true.len())
}

pub fn precision(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let c = Confusion::from_labels(y_true, y_pred);
    ratio(c.tp, c.tp + c.fp)
}

pub fn recall(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let c = Confusion::from_labels(y_true, y_pred);
    ratio(c.tp, c.tp + c.fn_)
}

pub fn f1(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let c = Confusion::from_labels(y_true, y_pred);
    ratio(2 * c.tp, 2 * c.tp + c.fp + c.fn_)
}

/// Area under the ROC curve from positive-class scores
///
/// Rank statistic with average ranks for ties. A single-class input has no
/// curve and scores 0.5.
pub fn roc_auc(y_true: &[f64], scores: &[f64]) -> f64 {
    let n_pos = y_true.iter().filter(|&&t| t == 1.0).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; tied block i..=j shares the average
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if y_true[idx] == 1.0 {
                rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

/// Score probabilities under a search metric; labels are thresholded at 0.5
pub fn score(scoring: Scoring, y_true: &[f64], proba: &[f64]) -> f64 {
    if scoring == Scoring::RocAuc {
        return roc_auc(y_true, proba);
    }
    let y_pred: Vec<f64> = proba
        .iter()
        .map(|&p| if p >= 0.5 { 1.0 } else { 0.0 })
        .collect();
    match scoring {
        Scoring::Accuracy => accuracy(y_true, &y_pred),
        Scoring::Precision => precision(y_true, &y_pred),
        Scoring::Recall => recall(y_true, &y_pred),
        Scoring::F1 | Scoring::RocAuc => f1(y_true, &y_pred),
    }
}

/// Held-out evaluation of the final model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ClassificationReport {
    pub fn evaluate(y_true: &[f64], y_pred: &[f64]) -> Self {
        Self {
            accuracy: accuracy(y_true, y_pred),
            precision: precision(y_true, y_pred),
            recall: recall(y_true, y_pred),
            f1: f1(y_true, y_pred),
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("accuracy".to_string(), self.accuracy),
            ("precision".to_string(), self.precision),
            ("recall".to_string(), self.recall),
            ("f1".to_string(), self.f1),
        ])
    }
}
