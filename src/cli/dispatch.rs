//! Subcommand execution

use anyhow::Context;
use tracing::{error, info};

use valuator_api::{ApiServer, ApiState, ServerConfig};
use valuator_core::{Settings, TrainingOrchestrator};

use crate::cli::{Command, EXIT_FAILURE, EXIT_SUCCESS};

/// Run one subcommand and map the outcome to an exit code
pub async fn run(command: Command, settings: Settings) -> i32 {
    let result = match command {
        Command::Train { data_path } => train(settings, data_path).await,
        Command::Serve { host, port } => serve(settings, host, port).await,
    };

    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    }
}

async fn train(settings: Settings, data_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let outcome = TrainingOrchestrator::new(settings)
        .run(data_path)
        .await
        .context("training failed")?;

    info!(
        model = %outcome.metadata.name,
        version = outcome.metadata.version,
        accepted_rows = outcome.validation.accepted_rows,
        rejected_rows = outcome.validation.rejected_rows,
        "Model registered"
    );
    Ok(())
}

async fn serve(settings: Settings, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let state = ApiState::from_settings(&settings).context("failed to prepare server state")?;

    let mut config = ServerConfig::from_settings(&settings);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    ApiServer::new(config, state).start().await
}
