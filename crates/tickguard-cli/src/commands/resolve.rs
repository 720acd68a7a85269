use std::sync::Arc;

use serde_json::json;
use tickguard_core::{AppConfig, Clock, ReqwestHttpClient, RouteError};
use tracing::debug;

use crate::cli::ResolveArgs;
use crate::error::CliError;

use super::CommandOutcome;

pub async fn run(
    args: &ResolveArgs,
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<CommandOutcome, CliError> {
    let router = config.build_router(clock, Arc::new(ReqwestHttpClient::new()))?;

    match router.resolve(args.capability, &args.identifier).await {
        Ok(resolution) => {
            debug!(source = ?resolution.source, stale = resolution.stale, "resolved");
            Ok(CommandOutcome::ok(serde_json::to_value(resolution)?))
        }
        Err(RouteError::AllProvidersUnavailable {
            capability,
            identifier,
            attempts,
        }) => {
            let data = json!({
                "error": "all_providers_unavailable",
                "capability": capability,
                "identifier": identifier,
                "attempts": attempts,
            });
            Ok(CommandOutcome::ok(data).with_exit_code(3))
        }
        Err(error) => Err(error.into()),
    }
}
