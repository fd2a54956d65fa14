//! Training orchestration

pub mod orchestrator;

pub use orchestrator::{TrainingOrchestrator, TrainingOutcome};
