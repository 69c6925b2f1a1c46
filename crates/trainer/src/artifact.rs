//! Persisted model artifact
//!
//! Canonical JSON with sorted keys. The BLAKE3 hash covers the document with
//! an empty `hash` field; it is stored both inside the document and in a
//! sibling `.hash` file.

use crate::booster::BoostedModel;
use crate::params::HyperParams;
use chrono::{DateTime, Utc};
use hotel_core::errors::{PipelineError, Result, ResultExt, Stage};
use hotel_core::serialization::{self, to_canonical_json};
use hotel_core::{ParamValue, Scoring};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Current artifact format version
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub model: BoostedModel,
    /// Feature names in the order the model expects them
    pub feature_columns: Vec<String>,
    pub label_column: String,
    /// Values drawn by the search for the winning candidate
    pub best_params: BTreeMap<String, ParamValue>,
    pub hyperparameters: HyperParams,
    pub scoring: Scoring,
    pub cv_best_score: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub hash: String,
}

impl ModelArtifact {
    pub fn new(
        model: BoostedModel,
        feature_columns: Vec<String>,
        label_column: &str,
        best_params: BTreeMap<String, ParamValue>,
        hyperparameters: HyperParams,
        scoring: Scoring,
        cv_best_score: f64,
    ) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            model,
            feature_columns,
            label_column: label_column.to_string(),
            best_params,
            hyperparameters,
            scoring,
            cv_best_score,
            created_at: Utc::now(),
            hash: String::new(),
        }
    }

    /// Hash of the canonical document with `hash` blanked
    pub fn content_hash(&self) -> Result<String> {
        serialization::content_hash(self, "hash").op(Stage::Training, "hash model")
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != ARTIFACT_VERSION {
            return Err(PipelineError::new(
                Stage::Training,
                "validate model",
                format!("unsupported artifact version {}", self.version),
            ));
        }
        self.model
            .validate()
            .map_err(|e| PipelineError::new(Stage::Training, "validate model", e))?;
        let n_features = self.feature_columns.len() as i32;
        for (t, tree) in self.model.trees.iter().enumerate() {
            if let Some(node) = tree.nodes.iter().find(|n| n.feature_idx >= n_features) {
                return Err(PipelineError::new(
                    Stage::Training,
                    "validate model",
                    "split on a feature outside feature_columns",
                )
                .with_context("tree", t)
                .with_context("feature_idx", node.feature_idx));
            }
        }
        Ok(())
    }

    /// Stamp the hash and write the document and its `.hash` file
    pub fn save(&mut self, model_path: &Path, hash_path: &Path) -> Result<String> {
        self.validate()?;
        self.hash = self.content_hash()?;

        for path in [model_path, hash_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .op(Stage::Training, "save model")
                    .map_err(|e| e.with_context("path", parent.display()))?;
            }
        }

        let json = to_canonical_json(self).op(Stage::Training, "save model")?;
        std::fs::write(model_path, json)
            .op(Stage::Training, "save model")
            .map_err(|e| e.with_context("path", model_path.display()))?;
        std::fs::write(hash_path, format!("{}\n", self.hash))
            .op(Stage::Training, "save model")
            .map_err(|e| e.with_context("path", hash_path.display()))?;

        info!("Model saved to {} (blake3 {})", model_path.display(), self.hash);
        Ok(self.hash.clone())
    }

    /// Read a saved artifact, checking structure and hash
    pub fn load(model_path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(model_path)
            .op(Stage::Training, "load model")
            .map_err(|e| e.with_context("path", model_path.display()))?;
        let artifact: ModelArtifact = serde_json::from_str(&json)
            .op(Stage::Training, "load model")
            .map_err(|e| e.with_context("path", model_path.display()))?;
        artifact.validate()?;

        let actual = artifact.content_hash()?;
        if actual != artifact.hash {
            return Err(PipelineError::new(
                Stage::Training,
                "load model",
                "model hash does not match its contents",
            )
            .with_context("expected", &artifact.hash)
            .with_context("actual", actual));
        }
        Ok(artifact)
    }

    /// Class-1 probability for a row ordered like `feature_columns`
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        self.model.predict_proba(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use hotel_core::tree::{Node, Tree};

    fn artifact() -> ModelArtifact {
        let tree = Tree::new(vec![
            Node::internal(0, 1, 45.5, 1, 2),
            Node::leaf(1, -0.12),
            Node::leaf(2, 0.31),
        ]);
        ModelArtifact::new(
            BoostedModel {
                bias: -0.4,
                trees: vec![tree],
            },
            vec!["lead_time".into(), "avg_price_per_room".into()],
            "booking_status",
            BTreeMap::from([("num_leaves".to_string(), ParamValue::Int(40))]),
            HyperParams::default(),
            Scoring::Accuracy,
            0.8731,
        )
    }

    #[test]
    fn test_save_and_load_preserve_hash() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let model_path = dir.path().join("models/lgbm_model.json");
        let hash_path = dir.path().join("models/lgbm_model.hash");

        let mut original = artifact();
        let hash = original.save(&model_path, &hash_path)?;
        assert_eq!(hash.len(), 64);
        assert_eq!(std::fs::read_to_string(&hash_path)?.trim(), hash);

        let loaded = ModelArtifact::load(&model_path)?;
        assert_eq!(loaded, original);
        assert_eq!(loaded.content_hash()?, hash);
        assert_eq!(loaded.predict_proba(&[0.0, 50.0]), original.predict_proba(&[0.0, 50.0]));
        Ok(())
    }

    #[test]
    fn test_tampered_artifact_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let model_path = dir.path().join("lgbm_model.json");
        let mut original = artifact();
        original.save(&model_path, &dir.path().join("lgbm_model.hash"))?;

        let json = std::fs::read_to_string(&model_path)?.replace("0.8731", "0.9999");
        std::fs::write(&model_path, json)?;
        let err = ModelArtifact::load(&model_path).unwrap_err();
        assert_eq!(err.operation, "load model");
        Ok(())
    }

    #[test]
    fn test_out_of_range_feature_fails_validation() {
        let mut bad = artifact();
        bad.feature_columns.truncate(1);
        assert!(bad.validate().is_err());
    }
}
