//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Property valuation: train and serve the pricing model
#[derive(Debug, Parser)]
#[command(name = "valuator", version, about)]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum Command {
    /// Train a model and register it as the next version
    Train {
        /// CSV file to train on; the configured SQL source is used otherwise
        #[arg(long)]
        data_path: Option<PathBuf>,
    },
    /// Serve the latest registered model over HTTP
    Serve {
        /// Bind host, overrides HOST
        #[arg(long)]
        host: Option<String>,
        /// Bind port, overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}
