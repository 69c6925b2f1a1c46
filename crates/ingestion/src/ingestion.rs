//! The ingestion stage: download the raw CSV, then split it

use crate::split::{split_frame, SPLIT_SEED};
use crate::store::{store_for_bucket, ObjectStore};
use hotel_core::errors::{Result, ResultExt, Stage};
use hotel_core::{ArtifactPaths, DataFrame, IngestionConfig, Telemetry};
use tracing::{error, info};

/// Row counts produced by one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionReport {
    pub raw_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Downloads `bucket_file_name` from the configured bucket into
/// `artifacts/raw/raw.csv` and writes the seeded train/test split beside it
pub struct DataIngestion {
    config: IngestionConfig,
    paths: ArtifactPaths,
    store: Box<dyn ObjectStore>,
    telemetry: Telemetry,
}

impl DataIngestion {
    /// Store chosen from `config.bucket_name`
    pub fn new(config: IngestionConfig, paths: ArtifactPaths, telemetry: Telemetry) -> Result<Self> {
        let store = store_for_bucket(&config.bucket_name)?;
        Ok(Self::with_store(config, paths, store, telemetry))
    }

    pub fn with_store(
        config: IngestionConfig,
        paths: ArtifactPaths,
        store: Box<dyn ObjectStore>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            config,
            paths,
            store,
            telemetry: telemetry.for_component("ingestion"),
        }
    }

    /// Run download and split
    pub fn run(&self) -> Result<IngestionReport> {
        self.telemetry.scope(|| {
            info!("Starting data ingestion");
            let result = self.download().and_then(|()| self.split());
            match &result {
                Ok(report) => info!(
                    "Data ingestion completed: {} rows, {} train, {} test",
                    report.raw_rows, report.train_rows, report.test_rows
                ),
                Err(e) => error!("Data ingestion failed: {}", e),
            }
            result
        })
    }

    fn download(&self) -> Result<()> {
        let raw_dir = self.paths.raw_dir();
        std::fs::create_dir_all(&raw_dir)
            .op(Stage::Ingestion, "create raw directory")
            .map_err(|e| e.with_context("path", raw_dir.display()))?;

        info!(
            "Downloading {} from {}",
            self.config.bucket_file_name,
            self.store.describe()
        );
        self.store
            .download(&self.config.bucket_file_name, &self.paths.raw_file())?;
        Ok(())
    }

    fn split(&self) -> Result<IngestionReport> {
        let raw_file = self.paths.raw_file();
        let frame = DataFrame::read_csv(&raw_file).map_err(|e| e.with_stage(Stage::Ingestion))?;

        let (train, test) = split_frame(&frame, self.config.train_ratio, SPLIT_SEED)?;
        train
            .write_csv(self.paths.train_file())
            .map_err(|e| e.with_stage(Stage::Ingestion))?;
        test.write_csv(self.paths.test_file())
            .map_err(|e| e.with_stage(Stage::Ingestion))?;

        info!(
            "Split {} into {} and {}",
            raw_file.display(),
            self.paths.train_file().display(),
            self.paths.test_file().display()
        );
        Ok(IngestionReport {
            raw_rows: frame.height(),
            train_rows: train.height(),
            test_rows: test.height(),
        })
    }
}
