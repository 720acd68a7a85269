use std::sync::Arc;

use serde_json::json;
use tickguard_core::{AppConfig, Clock, IsoDate};

use crate::cli::ArtifactsCommand;
use crate::error::CliError;

use super::CommandOutcome;

pub async fn run(
    command: &ArtifactsCommand,
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<CommandOutcome, CliError> {
    let store = config.open_artifact_store(clock)?;

    let data = match command {
        ArtifactsCommand::Cleanup => {
            let removed = store.cleanup_expired_data().await;
            json!({ "removed": removed })
        }
        ArtifactsCommand::Clear { ticker } => {
            let removed = store.clear_ticker_cache(ticker).await;
            json!({ "ticker": ticker, "removed": removed })
        }
        ArtifactsCommand::Sentiment { ticker, from, to } => {
            let start = IsoDate::parse(from)?;
            let end = IsoDate::parse(to)?;
            if end < start {
                return Err(CliError::Argument(format!(
                    "--to ({to}) must not be before --from ({from})"
                )));
            }
            let records = store.news_sentiment(ticker, start, end).await;
            let average = store.average_sentiment(ticker, start, end).await;
            json!({
                "ticker": ticker,
                "from": start,
                "to": end,
                "count": records.len(),
                "average_sentiment": average,
                "records": records,
            })
        }
    };

    Ok(CommandOutcome::ok(data))
}
