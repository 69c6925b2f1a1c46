//! Hotel reservation training pipeline
//!
//! Runs ingestion, preprocessing and training in order against one working
//! root. Both configuration documents are loaded and validated before the
//! first stage starts, so an invalid configuration never leaves partial
//! artifacts behind.

use clap::Parser;
use hotel_core::paths::{CONFIG_PATH, MODEL_PARAMS_PATH};
use hotel_core::{ArtifactPaths, ModelParams, PipelineConfig, Result, Telemetry};
use hotel_ingestion::{DataIngestion, IngestionReport};
use hotel_preprocessing::{DataProcessor, ProcessingReport};
use hotel_trainer::{ModelTraining, TrainingReport};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Parser, Debug, Clone)]
#[command(name = "hotel-pipeline")]
#[command(author = "Hotel Reservation ML Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train the hotel reservation cancellation classifier", long_about = None)]
pub struct Args {
    /// Pipeline configuration, relative to the root unless absolute
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Hyperparameter search document, relative to the root unless absolute
    #[arg(short, long)]
    pub params: Option<PathBuf>,

    /// Working root holding `config/`, `artifacts/` and `mlruns/`
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn config_path(&self) -> PathBuf {
        self.root
            .join(self.config.as_deref().unwrap_or(Path::new(CONFIG_PATH)))
    }

    pub fn params_path(&self) -> PathBuf {
        self.root
            .join(self.params.as_deref().unwrap_or(Path::new(MODEL_PARAMS_PATH)))
    }

    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// What each stage produced
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub ingestion: IngestionReport,
    pub processing: ProcessingReport,
    pub training: TrainingReport,
}

/// Both validated configuration documents
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub pipeline: PipelineConfig,
    pub params: ModelParams,
}

impl LoadedConfig {
    pub fn load(args: &Args) -> Result<Self> {
        Ok(Self {
            pipeline: PipelineConfig::load(args.config_path())?,
            params: ModelParams::load(args.params_path())?,
        })
    }
}

/// Load configuration, then run the three stages
pub fn run(args: &Args, telemetry: &Telemetry) -> Result<PipelineSummary> {
    let config = telemetry.scope(|| LoadedConfig::load(args))?;
    run_with_config(config, ArtifactPaths::new(&args.root), telemetry)
}

pub fn run_with_config(
    config: LoadedConfig,
    paths: ArtifactPaths,
    telemetry: &Telemetry,
) -> Result<PipelineSummary> {
    let ingestion =
        DataIngestion::new(config.pipeline.data_ingestion, paths.clone(), telemetry.clone())?
            .run()?;

    let processing =
        DataProcessor::new(config.pipeline.data_processing, paths.clone(), telemetry.clone())
            .process()?;

    let training = ModelTraining::new(paths, config.params, telemetry.clone()).run()?;

    telemetry.scope(|| {
        info!(
            "Pipeline finished: {} raw rows, {} features, model {}",
            ingestion.raw_rows,
            processing.selection.feature_names().len(),
            training.model_path.display()
        )
    });

    Ok(PipelineSummary {
        ingestion,
        processing,
        training,
    })
}
