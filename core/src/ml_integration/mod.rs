//! ML Integration Module
//!
//! Model fitting, evaluation and registration for the valuation pipeline.
//!
//! # Architecture
//!
//! - `encoder`: smoothed target encoding of categorical features
//! - `trainer`: gradient boosted trees and linear regression over the encoded matrix
//! - `pipeline`: encoder plus regressor, fitted and served as one unit
//! - `evaluation`: holdout scores, cross-validation and plots
//! - `model_management`: file-backed registry and run tracking
//! - `training`: the end-to-end training run
//!
//! # Usage
//!
//! ```rust,no_run
//! use valuator_core::config::Settings;
//! use valuator_core::ml_integration::TrainingOrchestrator;
//!
//! # async fn run() -> valuator_core::Result<()> {
//! let settings = Settings::from_env()?;
//! let outcome = TrainingOrchestrator::new(settings).run(None).await?;
//! println!("registered version {}", outcome.metadata.version);
//! # Ok(())
//! # }
//! ```

pub mod encoder;
pub mod evaluation;
pub mod metadata;
pub mod model_management;
pub mod pipeline;
pub mod trainer;
pub mod training;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export key types for convenience
pub use encoder::{EncoderParams, TargetEncoder};
pub use evaluation::{CrossValidationSummary, EvaluationConfig, EvaluationReport, Evaluator};
pub use metadata::{ModelMetadata, ModelType, RegressionMetrics};
pub use model_management::{FittedModel, ModelStore, TrackingRun};
pub use pipeline::{FittedPipeline, ModelPipeline, PipelineParams};
pub use trainer::{BoostingParams, EstimatorParams};
pub use training::{TrainingOrchestrator, TrainingOutcome};
