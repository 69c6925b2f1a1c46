//! The training stage
//!
//! Loads the processed tables, runs the randomized search, evaluates the
//! refit model on the test table, saves the artifact and records the run.

use crate::artifact::ModelArtifact;
use crate::metrics::ClassificationReport;
use crate::search::{RandomizedSearch, SearchOutcome};
use hotel_core::errors::{PipelineError, Result, Stage};
use hotel_core::{
    ArtifactPaths, DataFrame, ExperimentSink, FileRun, ModelParams, RunStatus, Telemetry,
    LABEL_COLUMN,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Feature matrix and labels of one processed table
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledData {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

impl LabeledData {
    /// Split a table into features and the 0/1 label column
    pub fn from_frame(frame: &DataFrame, label: &str) -> Result<Self> {
        let labels = frame
            .numeric_column(label)
            .map_err(|e| e.with_stage(Stage::Training))?
            .to_vec();
        if let Some(row) = labels.iter().position(|&l| l != 0.0 && l != 1.0) {
            return Err(PipelineError::new(
                Stage::Training,
                "load data",
                "label column must contain only 0 and 1",
            )
            .with_context("column", label)
            .with_context("row", row)
            .with_context("value", labels[row]));
        }

        let feature_names: Vec<String> = frame
            .names()
            .iter()
            .filter(|n| n.as_str() != label)
            .cloned()
            .collect();
        let rows = frame
            .numeric_rows(&feature_names)
            .map_err(|e| e.with_stage(Stage::Training))?;
        Ok(Self {
            feature_names,
            rows,
            labels,
        })
    }

    pub fn load(path: &Path, label: &str) -> Result<Self> {
        info!("Loading data from {}", path.display());
        let frame = DataFrame::read_csv(path).map_err(|e| e.with_stage(Stage::Training))?;
        Self::from_frame(&frame, label).map_err(|e| e.with_context("path", path.display()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Summary of one training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub metrics: ClassificationReport,
    pub best_params: BTreeMap<String, String>,
    pub cv_best_score: f64,
    pub model_path: PathBuf,
    pub model_hash: String,
}

pub struct ModelTraining {
    paths: ArtifactPaths,
    params: ModelParams,
    telemetry: Telemetry,
}

impl ModelTraining {
    pub fn new(paths: ArtifactPaths, params: ModelParams, telemetry: Telemetry) -> Self {
        Self {
            paths,
            params,
            telemetry: telemetry.for_component("training"),
        }
    }

    /// Run inside a new file-based tracking run under `mlruns/`
    pub fn run(&self) -> Result<TrainingReport> {
        let mut run = FileRun::start(self.paths.tracking_dir())?;
        let run_id = run.run_id().to_string();
        let result = self.run_with_sink(&mut run);
        let status = if result.is_ok() {
            RunStatus::Finished
        } else {
            RunStatus::Failed
        };
        let dir = run.finish(status)?;
        self.telemetry
            .scope(|| info!("Tracking run {} stored in {}", run_id, dir.display()));
        result
    }

    /// Train, evaluate, save and log to `sink`
    pub fn run_with_sink(&self, sink: &mut dyn ExperimentSink) -> Result<TrainingReport> {
        self.telemetry.scope(|| {
            info!("Starting model training pipeline");
            let result = self.run_steps(sink);
            match &result {
                Ok(_) => info!("Model training successfully completed"),
                Err(e) => error!("Error in model training pipeline: {}", e),
            }
            result
        })
    }

    fn run_steps(&self, sink: &mut dyn ExperimentSink) -> Result<TrainingReport> {
        let train_path = self.paths.processed_train_file();
        let test_path = self.paths.processed_test_file();

        info!("Logging the training and testing datasets");
        sink.log_artifact(&train_path, Some("datasets"))?;
        sink.log_artifact(&test_path, Some("datasets"))?;

        let (train, test) = self.load_and_split(&train_path, &test_path)?;
        let outcome = self.train(&train)?;
        let metrics = self.evaluate(&outcome, &test);

        let mut artifact = ModelArtifact::new(
            outcome.model,
            train.feature_names.clone(),
            LABEL_COLUMN,
            outcome.best.sampled.clone(),
            outcome.best.params.clone(),
            self.params.random_search_params.scoring,
            outcome.best_score,
        );
        let model_path = self.paths.model_file();
        let model_hash = artifact.save(&model_path, &self.paths.model_hash_file())?;

        info!("Logging the model, params and metrics");
        sink.log_artifact(&model_path, None)?;
        let best_params = outcome.best.params.to_param_map();
        sink.log_params(&best_params)?;
        sink.log_metrics(&metrics.to_map())?;
        sink.log_metric("cv_best_score", outcome.best_score)?;

        Ok(TrainingReport {
            metrics,
            best_params,
            cv_best_score: outcome.best_score,
            model_path,
            model_hash,
        })
    }

    /// Load both tables; test must carry exactly the train features
    pub fn load_and_split(&self, train_path: &Path, test_path: &Path) -> Result<(LabeledData, LabeledData)> {
        let train = LabeledData::load(train_path, LABEL_COLUMN)?;
        let test = LabeledData::load(test_path, LABEL_COLUMN)?;
        if train.feature_names != test.feature_names {
            return Err(PipelineError::new(
                Stage::Training,
                "load data",
                "train and test feature columns differ",
            )
            .with_context("train", train.feature_names.join(","))
            .with_context("test", test.feature_names.join(",")));
        }
        if train.is_empty() {
            return Err(PipelineError::new(Stage::Training, "load data", "training table is empty")
                .with_context("path", train_path.display()));
        }
        info!(
            "Loaded {} training and {} test rows with {} features",
            train.len(),
            test.len(),
            train.feature_names.len()
        );
        Ok((train, test))
    }

    pub fn train(&self, train: &LabeledData) -> Result<SearchOutcome> {
        info!("Starting hyperparameter tuning");
        let search = RandomizedSearch::new(
            self.params.lightgbm_params.clone(),
            self.params.random_search_params.clone(),
            self.telemetry.clone(),
        );
        let outcome = search.fit(&train.rows, &train.labels)?;
        info!("Best parameters are: {:?}", outcome.best.sampled);
        Ok(outcome)
    }

    pub fn evaluate(&self, outcome: &SearchOutcome, test: &LabeledData) -> ClassificationReport {
        let y_pred: Vec<f64> = test.rows.iter().map(|row| outcome.model.predict(row)).collect();
        let report = ClassificationReport::evaluate(&test.labels, &y_pred);
        info!("Accuracy score: {:.5}", report.accuracy);
        info!("Precision score: {:.5}", report.precision);
        info!("Recall score: {:.5}", report.recall);
        info!("F1 score: {:.5}", report.f1);
        report
    }
}
