//! Valuator Core
//!
//! Data loading, validation, model fitting and the model registry behind the
//! property valuation service. The HTTP layer lives in `valuator-api`.

pub mod config;
pub mod data;
pub mod error;
pub mod ml_integration;
pub mod schema;
pub mod validation;

pub use config::Settings;
pub use error::{Result, ValuatorError};
pub use ml_integration::{FittedModel, FittedPipeline, ModelPipeline, ModelStore, TrainingOrchestrator};
pub use schema::{PriceOutput, PropertyRecord, TrainingTable};
