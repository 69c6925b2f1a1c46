//! Importance-based feature selection

use hotel_core::errors::Result;
use hotel_core::DataFrame;

/// Features kept for training, with their importance scores
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSelection {
    features: Vec<(String, f64)>,
    label: String,
}

/// Pair names with scores, highest first; equal scores keep column order
pub fn rank_features(names: &[String], importances: &[f64]) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = names.iter().cloned().zip(importances.iter().copied()).collect();
    // Stable sort preserves the original order among ties
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

impl FeatureSelection {
    /// Top `k` of a ranking; keeps everything when fewer are ranked
    pub fn top_k(ranking: Vec<(String, f64)>, k: usize, label: &str) -> Self {
        let mut features = ranking;
        features.truncate(k);
        Self {
            features,
            label: label.to_string(),
        }
    }

    pub fn features(&self) -> &[(String, f64)] {
        &self.features
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Selected features in rank order, then the label
    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.feature_names();
        columns.push(self.label.clone());
        columns
    }

    /// Restrict a table to the selected columns
    ///
    /// The train table and the test table both go through this, so they end up
    /// with the same columns in the same order.
    pub fn project(&self, frame: &DataFrame) -> Result<DataFrame> {
        frame
            .select(&self.columns())
            .map_err(|e| e.with_context("selected", self.columns().join(",")))
    }
}
