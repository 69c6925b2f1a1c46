//! Typed pipeline configuration
//!
//! Two YAML documents drive a run: the pipeline config (`config.yaml`) and the
//! hyperparameter search document (`model_params.yaml`). Both are parsed into
//! raw structs whose fields are all optional, then validated in one pass so
//! that every missing or invalid key is reported together.

use crate::errors::{PipelineError, Result, ResultExt, Stage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Identifier columns dropped before modeling when present
pub const DEFAULT_ID_COLUMNS: [&str; 2] = ["Unnamed: 0", "Booking_ID"];

/// Trees grown by the feature-importance forest unless configured
pub const DEFAULT_IMPORTANCE_TREES: usize = 100;

/// Hyperparameters the boosted classifier accepts from the search space
pub const TUNABLE_PARAMETERS: [&str; 9] = [
    "n_estimators",
    "learning_rate",
    "num_leaves",
    "max_depth",
    "subsample",
    "colsample_bytree",
    "min_child_samples",
    "reg_lambda",
    "max_bin",
];

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub data_ingestion: IngestionConfig,
    pub data_processing: ProcessingConfig,
}

/// `data_ingestion` section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionConfig {
    pub bucket_name: String,
    pub bucket_file_name: String,
    pub train_ratio: f64,
}

/// `data_processing` section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingConfig {
    pub categorical_columns: Vec<String>,
    pub numerical_columns: Vec<String>,
    pub skewness_threshold: f64,
    pub no_of_features: usize,
    pub id_columns: Vec<String>,
    pub importance_trees: usize,
    pub encoding: EncodingPolicy,
}

/// How categorical vocabularies are fit across the train/test tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingPolicy {
    /// Fit on train, apply to test; unseen test values are an error
    #[default]
    Shared,
    /// Fit each table on its own values
    Independent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPipelineConfig {
    data_ingestion: Option<RawIngestion>,
    data_processing: Option<RawProcessing>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawIngestion {
    bucket_name: Option<String>,
    bucket_file_name: Option<String>,
    train_ratio: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProcessing {
    categorical_columns: Option<Vec<String>>,
    numerical_columns: Option<Vec<String>>,
    skewness_threshold: Option<f64>,
    no_of_features: Option<usize>,
    id_columns: Option<Vec<String>>,
    importance_trees: Option<usize>,
    encoding: Option<EncodingPolicy>,
}

/// Collects validation issues across a whole document
#[derive(Debug, Default)]
struct Issues(Vec<String>);

impl Issues {
    fn require<T>(&mut self, value: Option<T>, key: &str) -> Option<T> {
        if value.is_none() {
            self.0.push(format!("{key} is missing"));
        }
        value
    }

    fn push(&mut self, issue: String) {
        self.0.push(issue);
    }

    fn finish<T>(self, value: Option<T>) -> Result<T> {
        match value {
            Some(v) if self.0.is_empty() => Ok(v),
            _ => Err(PipelineError::config(&self.0)),
        }
    }
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .op(Stage::Config, "read configuration")
        .map_err(|e| e.with_context("path", path.display()))
}

impl PipelineConfig {
    /// Load and validate `config.yaml`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::from_yaml_str(&read_document(path)?)
            .map_err(|e| e.with_context("path", path.display()))?;
        info!("Loaded pipeline configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawPipelineConfig =
            serde_yaml::from_str(yaml).op(Stage::Config, "parse configuration")?;
        let mut issues = Issues::default();

        let ingestion = raw.data_ingestion.unwrap_or_default();
        let bucket_name = issues.require(ingestion.bucket_name, "data_ingestion.bucket_name");
        let bucket_file_name =
            issues.require(ingestion.bucket_file_name, "data_ingestion.bucket_file_name");
        let train_ratio = issues.require(ingestion.train_ratio, "data_ingestion.train_ratio");
        if let Some(r) = train_ratio {
            if !(r > 0.0 && r < 1.0) {
                issues.push(format!(
                    "data_ingestion.train_ratio must lie strictly between 0 and 1, got {r}"
                ));
            }
        }

        let processing = raw.data_processing.unwrap_or_default();
        let categorical_columns = issues.require(
            processing.categorical_columns,
            "data_processing.categorical_columns",
        );
        let numerical_columns = issues.require(
            processing.numerical_columns,
            "data_processing.numerical_columns",
        );
        let skewness_threshold = issues.require(
            processing.skewness_threshold,
            "data_processing.skewness_threshold",
        );
        let no_of_features =
            issues.require(processing.no_of_features, "data_processing.no_of_features");

        if let (Some(cat), Some(num)) = (&categorical_columns, &numerical_columns) {
            let cat_set: BTreeSet<&String> = cat.iter().collect();
            for col in num.iter().filter(|c| cat_set.contains(c)) {
                issues.push(format!(
                    "column {col} is listed as both categorical and numerical"
                ));
            }
        }
        if let Some(t) = skewness_threshold {
            if !t.is_finite() {
                issues.push(format!(
                    "data_processing.skewness_threshold must be finite, got {t}"
                ));
            } else if t < 0.0 {
                issues.push(format!(
                    "data_processing.skewness_threshold must not be negative, got {t}"
                ));
            }
        }
        if no_of_features == Some(0) {
            issues.push("data_processing.no_of_features must be at least 1".to_string());
        }
        if processing.importance_trees == Some(0) {
            issues.push("data_processing.importance_trees must be at least 1".to_string());
        }

        let config = match (
            bucket_name,
            bucket_file_name,
            train_ratio,
            categorical_columns,
            numerical_columns,
            skewness_threshold,
            no_of_features,
        ) {
            (Some(bn), Some(bf), Some(tr), Some(cat), Some(num), Some(st), Some(nf)) => {
                Some(PipelineConfig {
                    data_ingestion: IngestionConfig {
                        bucket_name: bn,
                        bucket_file_name: bf,
                        train_ratio: tr,
                    },
                    data_processing: ProcessingConfig {
                        categorical_columns: cat,
                        numerical_columns: num,
                        skewness_threshold: st,
                        no_of_features: nf,
                        id_columns: processing.id_columns.unwrap_or_else(|| {
                            DEFAULT_ID_COLUMNS.iter().map(|s| s.to_string()).collect()
                        }),
                        importance_trees: processing
                            .importance_trees
                            .unwrap_or(DEFAULT_IMPORTANCE_TREES),
                        encoding: processing.encoding.unwrap_or_default(),
                    },
                })
            }
            _ => None,
        };

        issues.finish(config)
    }
}

/// Scoring metric used to rank search candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    Accuracy,
    Precision,
    Recall,
    F1,
    RocAuc,
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scoring::Accuracy => "accuracy",
            Scoring::Precision => "precision",
            Scoring::Recall => "recall",
            Scoring::F1 => "f1",
            Scoring::RocAuc => "roc_auc",
        };
        f.write_str(name)
    }
}

/// A single hyperparameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Float(v) => v,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Sampling distribution for one hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// Uniform integer in `[low, high)`
    IntRange([i64; 2]),
    /// Uniform float in `[low, high]`
    FloatRange([f64; 2]),
    /// Uniform pick from a fixed list
    Choice(Vec<ParamValue>),
}

impl Distribution {
    fn validate(&self, name: &str, issues: &mut Issues) {
        match self {
            Distribution::IntRange([low, high]) if low >= high => issues.push(format!(
                "lightgbm_params.{name}: int_range [{low}, {high}) is empty"
            )),
            Distribution::FloatRange([low, high])
                if !(low.is_finite() && high.is_finite() && low <= high) =>
            {
                issues.push(format!(
                    "lightgbm_params.{name}: float_range [{low}, {high}] is invalid"
                ))
            }
            Distribution::Choice(values) if values.is_empty() => {
                issues.push(format!("lightgbm_params.{name}: choice list is empty"))
            }
            _ => {}
        }
    }
}

/// Meta-parameters of the randomized search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RandomSearchParams {
    pub n_iter: usize,
    pub scoring: Scoring,
    /// Worker threads; `-1` means one per core
    pub n_jobs: i64,
    pub cv: usize,
    pub verbose: u8,
    pub random_state: u64,
}

/// The hyperparameter document: search space plus search settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelParams {
    pub lightgbm_params: BTreeMap<String, Distribution>,
    pub random_search_params: RandomSearchParams,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawModelParams {
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    lightgbm_params: Option<BTreeMap<String, Distribution>>,
    random_search_params: Option<RawSearch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSearch {
    n_iter: Option<usize>,
    scoring: Option<Scoring>,
    n_jobs: Option<i64>,
    cv: Option<usize>,
    verbose: Option<u8>,
    random_state: Option<u64>,
}

impl ModelParams {
    /// Load and validate `model_params.yaml`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let params = Self::from_yaml_str(&read_document(path)?)
            .map_err(|e| e.with_context("path", path.display()))?;
        info!("Loaded hyperparameter search space from {}", path.display());
        Ok(params)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawModelParams =
            serde_yaml::from_str(yaml).op(Stage::Config, "parse hyperparameters")?;
        let mut issues = Issues::default();

        let space = issues.require(raw.lightgbm_params, "lightgbm_params");
        if let Some(space) = &space {
            for (name, dist) in space {
                if !TUNABLE_PARAMETERS.contains(&name.as_str()) {
                    issues.push(format!("lightgbm_params.{name} is not a tunable parameter"));
                }
                dist.validate(name, &mut issues);
            }
        }

        let search = raw.random_search_params.unwrap_or_default();
        let n_iter = issues.require(search.n_iter, "random_search_params.n_iter");
        let scoring = issues.require(search.scoring, "random_search_params.scoring");
        let n_jobs = issues.require(search.n_jobs, "random_search_params.n_jobs");
        let cv = issues.require(search.cv, "random_search_params.cv");
        let verbose = issues.require(search.verbose, "random_search_params.verbose");
        let random_state = issues.require(search.random_state, "random_search_params.random_state");

        if n_iter == Some(0) {
            issues.push("random_search_params.n_iter must be at least 1".to_string());
        }
        if matches!(cv, Some(c) if c < 2) {
            issues.push("random_search_params.cv must be at least 2".to_string());
        }
        if matches!(n_jobs, Some(j) if j == 0 || j < -1) {
            issues.push("random_search_params.n_jobs must be -1 or positive".to_string());
        }

        let params = match (space, n_iter, scoring, n_jobs, cv, verbose, random_state) {
            (Some(space), Some(n_iter), Some(scoring), Some(n_jobs), Some(cv), Some(verbose), Some(random_state)) => {
                Some(ModelParams {
                    lightgbm_params: space,
                    random_search_params: RandomSearchParams {
                        n_iter,
                        scoring,
                        n_jobs,
                        cv,
                        verbose,
                        random_state,
                    },
                })
            }
            _ => None,
        };

        issues.finish(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE_YAML: &str = r#"
data_ingestion:
  bucket_name: "my-bucket"
  bucket_file_name: "Hotel_Reservations.csv"
  train_ratio: 0.8
data_processing:
  categorical_columns: [type_of_meal_plan, booking_status]
  numerical_columns: [lead_time, avg_price_per_room]
  skewness_threshold: 5
  no_of_features: 10
"#;

    const PARAMS_YAML: &str = r#"
lightgbm_params:
  n_estimators: { int_range: [100, 500] }
  learning_rate: { float_range: [0.01, 0.2] }
  num_leaves: { choice: [15, 31, 63] }
random_search_params:
  n_iter: 4
  scoring: accuracy
  n_jobs: -1
  cv: 3
  verbose: 1
  random_state: 42
"#;

    #[test]
    fn parses_complete_pipeline_config_with_defaults() {
        let config = PipelineConfig::from_yaml_str(PIPELINE_YAML).unwrap();
        assert_eq!(config.data_ingestion.bucket_name, "my-bucket");
        assert_eq!(config.data_ingestion.train_ratio, 0.8);
        assert_eq!(config.data_processing.no_of_features, 10);
        assert_eq!(config.data_processing.skewness_threshold, 5.0);
        assert_eq!(
            config.data_processing.id_columns,
            vec!["Unnamed: 0".to_string(), "Booking_ID".to_string()]
        );
        assert_eq!(config.data_processing.importance_trees, DEFAULT_IMPORTANCE_TREES);
        assert_eq!(config.data_processing.encoding, EncodingPolicy::Shared);
    }

    #[test]
    fn reports_every_missing_key_at_once() {
        let err = PipelineConfig::from_yaml_str("data_ingestion:\n  train_ratio: 0.8\n")
            .unwrap_err();
        assert_eq!(err.stage, Stage::Config);
        for key in [
            "data_ingestion.bucket_name",
            "data_ingestion.bucket_file_name",
            "data_processing.categorical_columns",
            "data_processing.numerical_columns",
            "data_processing.skewness_threshold",
            "data_processing.no_of_features",
        ] {
            assert!(err.message.contains(key), "missing {key} in {}", err.message);
        }
        assert!(!err.message.contains("train_ratio"));
    }

    #[test]
    fn rejects_out_of_range_ratio_and_overlapping_columns() {
        let yaml = PIPELINE_YAML
            .replace("train_ratio: 0.8", "train_ratio: 1.0")
            .replace("[lead_time, avg_price_per_room]", "[lead_time, booking_status]");
        let err = PipelineConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(err.message.contains("strictly between 0 and 1"));
        assert!(err.message.contains("booking_status is listed as both"));
    }

    #[test]
    fn rejects_negative_skewness_threshold() {
        let yaml = PIPELINE_YAML.replace("skewness_threshold: 5", "skewness_threshold: -0.5");
        let err = PipelineConfig::from_yaml_str(&yaml).unwrap_err();
        assert_eq!(err.stage, Stage::Config);
        assert!(err.message.contains("skewness_threshold must not be negative"));

        let yaml = PIPELINE_YAML.replace("skewness_threshold: 5", "skewness_threshold: 0");
        let config = PipelineConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.data_processing.skewness_threshold, 0.0);
    }

    #[test]
    fn parses_model_params() {
        let params = ModelParams::from_yaml_str(PARAMS_YAML).unwrap();
        assert_eq!(params.lightgbm_params.len(), 3);
        assert_eq!(
            params.lightgbm_params["n_estimators"],
            Distribution::IntRange([100, 500])
        );
        assert_eq!(
            params.lightgbm_params["num_leaves"],
            Distribution::Choice(vec![
                ParamValue::Int(15),
                ParamValue::Int(31),
                ParamValue::Int(63)
            ])
        );
        assert_eq!(params.random_search_params.scoring, Scoring::Accuracy);
        assert_eq!(params.random_search_params.n_jobs, -1);
    }

    #[test]
    fn rejects_unknown_parameters_and_empty_ranges() {
        let yaml = PARAMS_YAML
            .replace("n_estimators: { int_range: [100, 500] }", "n_estimators: { int_range: [5, 5] }")
            .replace("num_leaves:", "boosting_type:")
            .replace("cv: 3", "cv: 1");
        let err = ModelParams::from_yaml_str(&yaml).unwrap_err();
        assert!(err.message.contains("int_range [5, 5) is empty"));
        assert!(err.message.contains("boosting_type is not a tunable parameter"));
        assert!(err.message.contains("cv must be at least 2"));
    }
}
