//! Training stage of the hotel reservation pipeline
//!
//! Modules:
//! - `params`: boosted-tree hyperparameters
//! - `booster`: histogram gradient boosting for binary labels
//! - `metrics`: classification metrics
//! - `search`: randomized search with stratified cross-validation
//! - `artifact`: hashed canonical-JSON model artifact
//! - `trainer`: the stage runner

pub mod artifact;
pub mod booster;
pub mod metrics;
pub mod params;
pub mod search;
pub mod trainer;

pub use artifact::ModelArtifact;
pub use booster::{BoostedModel, GbdtTrainer};
pub use metrics::ClassificationReport;
pub use params::HyperParams;
pub use search::{sample_candidates, stratified_k_fold, Candidate, RandomizedSearch, SearchOutcome};
pub use trainer::{LabeledData, ModelTraining, TrainingReport};
