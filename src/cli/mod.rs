//! CLI module
//!
//! Provides:
//! - Argument parsing for the `train` and `serve` subcommands
//! - Tracing subscriber setup
//! - Subcommand dispatch with deterministic exit codes

pub mod args;
pub mod dispatch;
pub mod logging;

// Re-exports
pub use args::{Args, Command, LogFormat};
pub use dispatch::run;

/// Exit codes (deterministic)
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
