use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use super::env::{CliArgs, Commands};
use super::run::cmd_run;
use super::runtime::{init_logging, load_config, load_local_env_overrides, LoadedConfig};
use super::serve::cmd_serve;

/// The workflow ran and succeeded (or the server shut down cleanly).
pub const EXIT_SUCCESS: u8 = 0;
/// The workflow ran and halted at a stage.
pub const EXIT_WORKFLOW_FAILED: u8 = 1;
/// Nothing ran: bad configuration, arguments or inputs.
pub const EXIT_CONFIG_ERROR: u8 = 2;

pub async fn run() -> ExitCode {
    load_local_env_overrides();
    let cli = CliArgs::parse();

    let loaded = match load_config(cli.config.as_ref()).await {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("error: {:#}", err);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let LoadedConfig { config, path } = loaded;

    let level = cli.log_level.clone().unwrap_or_else(|| config.log.level.clone());
    if let Err(err) = init_logging(&level, cli.debug, cli.log_json || config.log.json) {
        eprintln!("error: {:#}", err);
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }
    info!(
        config = ?path.as_ref().map(|path| path.display().to_string()),
        "Starting portalflow v{}",
        env!("CARGO_PKG_VERSION")
    );

    let code = match cli.command {
        Commands::Serve(args) => match cmd_serve(args, &config).await {
            Ok(()) => EXIT_SUCCESS,
            Err(err) => {
                error!("Server failed: {:#}", err);
                EXIT_CONFIG_ERROR
            }
        },
        Commands::Run(args) => match cmd_run(args, &config).await {
            Ok(true) => EXIT_SUCCESS,
            Ok(false) => EXIT_WORKFLOW_FAILED,
            Err(err) => {
                error!("Run not started: {:#}", err);
                EXIT_CONFIG_ERROR
            }
        },
    };
    ExitCode::from(code)
}
