//! Experiment tracking sink
//!
//! Runs record parameters, metrics and artifact files. [`FileRun`] keeps a
//! run under `<root>/<run_id>/` with `params.json`, `metrics.json`,
//! `meta.json` and an `artifacts/` tree; records are flushed on every call so
//! a failed run still leaves what it logged.

use crate::errors::{PipelineError, Result, ResultExt, Stage};
use crate::serialization::to_canonical_json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for run parameters, metrics and artifacts
pub trait ExperimentSink {
    fn log_param(&mut self, key: &str, value: &str) -> Result<()>;

    fn log_metric(&mut self, key: &str, value: f64) -> Result<()>;

    /// Copy `path` into the run, optionally under `artifact_path`
    fn log_artifact(&mut self, path: &Path, artifact_path: Option<&str>) -> Result<()>;

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        for (key, value) in params {
            self.log_param(key, value)?;
        }
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<()> {
        for (key, value) in metrics {
            self.log_metric(key, *value)?;
        }
        Ok(())
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Serialize)]
struct RunMeta {
    run_id: String,
    status: RunStatus,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

/// A run stored on the local filesystem
#[derive(Debug)]
pub struct FileRun {
    dir: PathBuf,
    run_id: String,
    started_at: DateTime<Utc>,
    params: BTreeMap<String, String>,
    metrics: BTreeMap<String, f64>,
    artifacts: Vec<PathBuf>,
}

fn tracking_error(err: PipelineError, path: &Path) -> PipelineError {
    err.with_context("path", path.display())
}

impl FileRun {
    /// Start a new run under `root`
    pub fn start<P: AsRef<Path>>(root: P) -> Result<Self> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let dir = root.as_ref().join(&run_id);
        std::fs::create_dir_all(dir.join("artifacts"))
            .op(Stage::Training, "start tracking run")
            .map_err(|e| tracking_error(e, &dir))?;

        let run = Self {
            dir,
            run_id,
            started_at: Utc::now(),
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
        };
        run.write_meta(RunStatus::Running, None)?;
        debug!("Started tracking run {} in {}", run.run_id, run.dir.display());
        Ok(run)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn metrics(&self) -> &BTreeMap<String, f64> {
        &self.metrics
    }

    /// Artifact files copied into the run, relative to its `artifacts/` dir
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Close the run with a final status
    pub fn finish(self, status: RunStatus) -> Result<PathBuf> {
        self.write_meta(status, Some(Utc::now()))?;
        Ok(self.dir)
    }

    fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file_name);
        let json = to_canonical_json(value).op(Stage::Training, "write tracking record")?;
        std::fs::write(&path, json)
            .op(Stage::Training, "write tracking record")
            .map_err(|e| tracking_error(e, &path))
    }

    fn write_meta(&self, status: RunStatus, end_time: Option<DateTime<Utc>>) -> Result<()> {
        let meta = RunMeta {
            run_id: self.run_id.clone(),
            status,
            start_time: self.started_at,
            end_time,
        };
        self.write_json("meta.json", &meta)
    }
}

impl ExperimentSink for FileRun {
    fn log_param(&mut self, key: &str, value: &str) -> Result<()> {
        self.params.insert(key.to_string(), value.to_string());
        self.write_json("params.json", &self.params)
    }

    fn log_metric(&mut self, key: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(
                PipelineError::new(Stage::Training, "log metric", "metric value is not finite")
                    .with_context("metric", key),
            );
        }
        self.metrics.insert(key.to_string(), value);
        self.write_json("metrics.json", &self.metrics)
    }

    fn log_artifact(&mut self, path: &Path, artifact_path: Option<&str>) -> Result<()> {
        let file_name = path.file_name().ok_or_else(|| {
            PipelineError::new(Stage::Training, "log artifact", "artifact has no file name")
                .with_context("path", path.display())
        })?;
        let relative = match artifact_path {
            Some(sub) => Path::new(sub).join(file_name),
            None => PathBuf::from(file_name),
        };
        let dest = self.dir.join("artifacts").join(&relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .op(Stage::Training, "log artifact")
                .map_err(|e| tracking_error(e, parent))?;
        }
        std::fs::copy(path, &dest)
            .op(Stage::Training, "log artifact")
            .map_err(|e| tracking_error(e, path))?;
        self.artifacts.push(relative);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_run_records_params_metrics_and_artifacts() -> Result<()> {
        let root = tempfile::tempdir()?;
        let source = root.path().join("train.csv");
        std::fs::write(&source, "a,b\n1,2\n")?;

        let mut run = FileRun::start(root.path().join("mlruns"))?;
        run.log_param("num_leaves", "31")?;
        run.log_metric("accuracy", 0.875)?;
        run.log_artifact(&source, Some("datasets"))?;
        let dir = run.finish(RunStatus::Finished)?;

        let metrics: BTreeMap<String, f64> =
            serde_json::from_str(&std::fs::read_to_string(dir.join("metrics.json"))?)?;
        assert_eq!(metrics["accuracy"], 0.875);
        let params: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(dir.join("params.json"))?)?;
        assert_eq!(params["num_leaves"], "31");
        assert!(dir.join("artifacts/datasets/train.csv").exists());

        let meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("meta.json"))?)?;
        assert_eq!(meta["status"], "FINISHED");
        assert!(meta["end_time"].is_string());
        Ok(())
    }

    #[test]
    fn test_non_finite_metric_is_rejected() -> Result<()> {
        let root = tempfile::tempdir()?;
        let mut run = FileRun::start(root.path())?;
        assert!(run.log_metric("f1", f64::NAN).is_err());
        Ok(())
    }
}
