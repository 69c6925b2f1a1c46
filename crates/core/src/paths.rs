//! Fixed filesystem layout shared by the pipeline stages
//!
//! Every stage reads the previous stage's files and writes its own under a
//! single working root (the current directory for the CLI).

use std::path::{Path, PathBuf};

pub const RAW_DIR: &str = "artifacts/raw";
pub const RAW_FILE_NAME: &str = "raw.csv";
pub const TRAIN_FILE_NAME: &str = "train.csv";
pub const TEST_FILE_NAME: &str = "test.csv";

pub const PROCESSED_DIR: &str = "artifacts/processed";
pub const PROCESSED_TRAIN_FILE_NAME: &str = "processed_train.csv";
pub const PROCESSED_TEST_FILE_NAME: &str = "processed_test.csv";

pub const MODEL_DIR: &str = "artifacts/models";
pub const MODEL_FILE_NAME: &str = "lgbm_model.json";
pub const MODEL_HASH_FILE_NAME: &str = "lgbm_model.hash";

pub const TRACKING_DIR: &str = "mlruns";

pub const CONFIG_PATH: &str = "config/config.yaml";
pub const MODEL_PARAMS_PATH: &str = "config/model_params.yaml";

/// Resolves the artifact layout under a working root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    root: PathBuf,
}

impl ArtifactPaths {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join(RAW_DIR)
    }

    pub fn raw_file(&self) -> PathBuf {
        self.raw_dir().join(RAW_FILE_NAME)
    }

    pub fn train_file(&self) -> PathBuf {
        self.raw_dir().join(TRAIN_FILE_NAME)
    }

    pub fn test_file(&self) -> PathBuf {
        self.raw_dir().join(TEST_FILE_NAME)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join(PROCESSED_DIR)
    }

    pub fn processed_train_file(&self) -> PathBuf {
        self.processed_dir().join(PROCESSED_TRAIN_FILE_NAME)
    }

    pub fn processed_test_file(&self) -> PathBuf {
        self.processed_dir().join(PROCESSED_TEST_FILE_NAME)
    }

    pub fn model_file(&self) -> PathBuf {
        self.root.join(MODEL_DIR).join(MODEL_FILE_NAME)
    }

    pub fn model_hash_file(&self) -> PathBuf {
        self.root.join(MODEL_DIR).join(MODEL_HASH_FILE_NAME)
    }

    pub fn tracking_dir(&self) -> PathBuf {
        self.root.join(TRACKING_DIR)
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted() {
        let paths = ArtifactPaths::new("/tmp/run");
        assert_eq!(paths.raw_file(), PathBuf::from("/tmp/run/artifacts/raw/raw.csv"));
        assert_eq!(
            paths.processed_test_file(),
            PathBuf::from("/tmp/run/artifacts/processed/processed_test.csv")
        );
        assert_eq!(
            paths.model_file(),
            PathBuf::from("/tmp/run/artifacts/models/lgbm_model.json")
        );
    }
}
