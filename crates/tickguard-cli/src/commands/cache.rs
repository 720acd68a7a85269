use std::sync::Arc;

use serde_json::json;
use tickguard_core::{AppConfig, Clock};

use crate::cli::CacheCommand;
use crate::error::CliError;

use super::CommandOutcome;

pub async fn run(
    command: &CacheCommand,
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<CommandOutcome, CliError> {
    let data = match command {
        CacheCommand::Details => serde_json::to_value(config.cache_provider_details())?,
        CacheCommand::Stats => serde_json::to_value(config.build_cache(clock)?.stats().await)?,
        CacheCommand::Clear { pattern } => {
            let removed = config.build_cache(clock)?.clear(pattern.as_deref()).await;
            json!({ "pattern": pattern, "removed": removed })
        }
        CacheCommand::Age { key } => {
            let age_ms = config
                .build_cache(clock)?
                .age(key)
                .await
                .map(|age| u64::try_from(age.as_millis()).unwrap_or(u64::MAX));
            json!({ "key": key, "present": age_ms.is_some(), "age_ms": age_ms })
        }
    };

    Ok(CommandOutcome::ok(data))
}
