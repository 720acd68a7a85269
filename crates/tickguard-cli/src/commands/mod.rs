mod artifacts;
mod cache;
mod providers;
mod resolve;
mod validate;

use std::sync::Arc;

use serde_json::Value;
use tickguard_core::{AppConfig, Clock, SystemClock};

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// JSON payload plus the exit code to report after printing it.
pub struct CommandOutcome {
    pub data: Value,
    pub exit_code: u8,
}

impl CommandOutcome {
    pub fn ok(data: Value) -> Self {
        Self { data, exit_code: 0 }
    }

    pub fn with_exit_code(mut self, exit_code: u8) -> Self {
        self.exit_code = exit_code;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutcome, CliError> {
    let config = AppConfig::from_env()?;
    run_with(cli, &config).await
}

/// Every command except `validate` refuses to start on a fatal report.
async fn run_with(cli: &Cli, config: &AppConfig) -> Result<CommandOutcome, CliError> {
    if !matches!(cli.command, Command::Validate) {
        config.validate().enforce(config.mode)?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    match &cli.command {
        Command::Validate => validate::run(config),
        Command::Resolve(args) => resolve::run(args, config, clock).await,
        Command::Providers => providers::run(config, clock),
        Command::Cache(args) => cache::run(&args.command, config, clock).await,
        Command::Artifacts(args) => artifacts::run(&args.command, config, clock).await,
    }
}
