//! Model Management Module
//!
//! Versioned storage of fitted pipelines and training run tracking.

pub mod registry;

pub use registry::{FittedModel, ModelStore, TrackingRun};
