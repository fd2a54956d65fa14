//! Valuator CLI
//!
//! - `valuator train [--data-path <csv>]`
//! - `valuator serve [--host <h>] [--port <p>]`

use clap::Parser;

use valuator::cli::{self, Args};
use valuator_core::Settings;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; real environment variables still apply
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let settings = Settings::from_env();

    let level = settings
        .as_ref()
        .map(|s| s.log_level.as_str())
        .unwrap_or(cli::logging::DEFAULT_FILTER);
    if let Err(e) = cli::logging::init(args.log_format, level) {
        eprintln!("Error: failed to initialise logging: {}", e);
        std::process::exit(cli::EXIT_FAILURE);
    }

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("failed to load settings: {}", e);
            std::process::exit(cli::EXIT_FAILURE);
        }
    };

    let exit_code = cli::run(args.command, settings).await;
    std::process::exit(exit_code);
}
