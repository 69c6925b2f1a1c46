//! Shared building blocks for the hotel reservation cancellation pipeline
//!
//! Modules:
//! - `config`: typed, eagerly validated pipeline and search configuration
//! - `errors`: the single structured pipeline error
//! - `paths`: fixed artifact layout
//! - `table`: column-oriented tables with CSV I/O
//! - `tree`: decision tree representation and feature quantisation
//! - `serialization`: canonical JSON and content hashing
//! - `telemetry`: injected tracing capability
//! - `tracking`: experiment tracking sink

pub mod config;
pub mod errors;
pub mod paths;
pub mod serialization;
pub mod table;
pub mod telemetry;
pub mod tracking;
pub mod tree;

pub use config::{
    Distribution, EncodingPolicy, IngestionConfig, ModelParams, ParamValue, PipelineConfig,
    ProcessingConfig, RandomSearchParams, Scoring,
};
pub use errors::{PipelineError, Result, ResultExt, Stage};
pub use paths::ArtifactPaths;
pub use table::{Column, DataFrame};
pub use telemetry::Telemetry;
pub use tracking::{ExperimentSink, FileRun, RunStatus};
pub use tree::{BinnedMatrix, Node, SplitCandidate, Tree};

/// Name of the label column in every table
pub const LABEL_COLUMN: &str = "booking_status";

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
