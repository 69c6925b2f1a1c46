//! Data ingestion for the hotel reservation pipeline
//!
//! Fetches one object from a bucket and splits it into train and test CSV
//! files under `artifacts/raw/`.

pub mod ingestion;
pub mod split;
pub mod store;

pub use ingestion::{DataIngestion, IngestionReport};
pub use split::{split_frame, train_size, SPLIT_SEED};
pub use store::{store_for_bucket, GcsStore, LocalStore, ObjectStore};
