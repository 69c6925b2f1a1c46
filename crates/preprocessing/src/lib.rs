//! Preprocessing stage of the hotel reservation pipeline
//!
//! - `encoding`: label encoding of categorical columns
//! - `skew`: sample skewness and the log1p transform
//! - `smote`: minority oversampling
//! - `forest`: random forest feature importance
//! - `selection`: top-K feature selection and projection
//! - `processor`: the stage runner tying the steps together

pub mod encoding;
pub mod forest;
pub mod processor;
pub mod selection;
pub mod skew;
pub mod smote;

pub use encoding::LabelEncoder;
pub use forest::{ForestConfig, RandomForest};
pub use processor::{deskew, DataProcessor, FittedEncoders, ProcessingReport};
pub use selection::{rank_features, FeatureSelection};
pub use skew::{log1p_column, skewness};
pub use smote::Smote;
