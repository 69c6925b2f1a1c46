//! Error type shared by every pipeline stage
//!
//! The pipeline has exactly one failure kind. Each public operation wraps
//! whatever went wrong underneath into a [`PipelineError`] that records the
//! stage, the operation, free-form context and the call site that wrapped it.

use std::fmt;
use std::panic::Location;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Config,
    Ingestion,
    Preprocessing,
    Training,
    /// Table operations shared by every stage; runners re-tag these
    Data,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Ingestion => "ingestion",
            Stage::Preprocessing => "preprocessing",
            Stage::Training => "training",
            Stage::Data => "data",
        };
        f.write_str(name)
    }
}

/// Structured pipeline failure
#[derive(Debug, Error)]
#[error(
    "{stage}: {operation} failed at {location}: {message}{}",
    render_context(.context)
)]
pub struct PipelineError {
    /// Stage that raised the error
    pub stage: Stage,
    /// Operation name, e.g. `"split data"`
    pub operation: &'static str,
    /// Human readable description
    pub message: String,
    /// Extra key/value pairs (paths, column names, counts)
    pub context: Vec<(String, String)>,
    /// Source location of the wrapping call site
    pub location: &'static Location<'static>,
    /// Underlying error, if any
    #[source]
    pub cause: Option<BoxError>,
}

fn render_context(context: &[(String, String)]) -> String {
    if context.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = context.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!(" [{}]", pairs.join(", "))
}

impl PipelineError {
    /// Create an error without an underlying cause
    #[track_caller]
    pub fn new(stage: Stage, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            operation,
            message: message.into(),
            context: Vec::new(),
            location: Location::caller(),
            cause: None,
        }
    }

    /// Wrap a foreign error, using its display text as the message
    #[track_caller]
    pub fn wrap<E>(stage: Stage, operation: &'static str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            stage,
            operation,
            message: err.to_string(),
            context: Vec::new(),
            location: Location::caller(),
            cause: Some(Box::new(err)),
        }
    }

    /// Configuration failure listing every issue found
    #[track_caller]
    pub fn config(issues: &[String]) -> Self {
        let message = if issues.len() == 1 {
            issues[0].clone()
        } else {
            format!("{} problems: {}", issues.len(), issues.join("; "))
        };
        Self::new(Stage::Config, "validate configuration", message)
    }

    /// Attach a key/value pair of context
    pub fn with_context(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }

    /// Re-tag the error with the stage that surfaced it
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// Look up a context value by key
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Adaptor for wrapping foreign errors at an operation boundary
pub trait ResultExt<T> {
    /// Wrap the error into a [`PipelineError`] for `stage`/`operation`
    fn op(self, stage: Stage, operation: &'static str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn op(self, stage: Stage, operation: &'static str) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(PipelineError::wrap(stage, operation, err)),
        }
    }
}
