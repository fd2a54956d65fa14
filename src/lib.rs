//! Valuator: property valuation model training and serving
//!
//! The binary wires the `valuator-core` training run and the `valuator-api`
//! server behind a small CLI.

pub mod cli;
