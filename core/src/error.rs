//! Error taxonomy for the valuation pipeline
//!
//! Each component owns a small error enum; [`ValuatorError`] gathers them so
//! the training entry point can bubble any of them up with `?`.

use std::io;
use std::path::PathBuf;

/// Failures while reading the training source
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("CSV file not found at: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to parse data source: {0}")]
    Parse(String),

    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Database query failed: {0}")]
    Query(String),

    #[error("Data source returned no rows")]
    Empty,

    #[error("Either a data path or SQL connection details must be provided")]
    NoSource,
}

/// Failures of the row-wise validation pass
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("Rejected {rejected} of {total} rows ({rate:.3}), above threshold {threshold:.3}")]
    RejectionRateExceeded {
        rejected: usize,
        total: usize,
        rate: f64,
        threshold: f64,
    },

    #[error("No valid rows left after validation")]
    NoValidRows,

    #[error("Frame access failed: {0}")]
    Frame(String),
}

/// Failures while fitting the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Not enough rows to fit: {rows} rows for {features} features")]
    InsufficientData { rows: usize, features: usize },

    #[error("Model fitting failed: {0}")]
    Fit(String),
}

/// Failures while scoring a single record
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("Unseen category '{value}' for field '{field}'")]
    UnseenCategory { field: String, value: String },

    #[error("Prediction produced a non-finite value")]
    NonFinite,

    #[error("Artifact features {found:?} do not match expected {expected:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Model evaluation failed: {0}")]
    Model(String),
}

/// Failures of the model registry client
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No versions found for model '{0}'")]
    NotFound(String),

    #[error("Model '{name}' version '{version}' does not exist")]
    VersionNotFound { name: String, version: u32 },

    #[error("Unsupported registry URI: {0}")]
    UnsupportedUri(String),

    #[error("Invalid model name: '{0}'")]
    InvalidName(String),

    #[error("Registry IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Incompatible artifact: {0}")]
    Incompatible(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures while resolving settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("API_KEY must be set to serve predictions")]
    MissingApiKey,

    #[error("Invalid setting '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

/// Failures while producing diagnostics
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Plot rendering failed: {0}")]
    Plot(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Umbrella error for the training run
#[derive(Debug, thiserror::Error)]
pub enum ValuatorError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

pub type Result<T, E = ValuatorError> = std::result::Result<T, E>;
