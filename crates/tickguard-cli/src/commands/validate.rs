use serde_json::json;
use tickguard_core::AppConfig;

use crate::error::CliError;

use super::CommandOutcome;

pub fn run(config: &AppConfig) -> Result<CommandOutcome, CliError> {
    let report = config.validate();
    let fatal = report.enforce(config.mode).is_err();

    let data = json!({
        "mode": config.mode,
        "fatal": fatal,
        "report": report,
    });

    let outcome = CommandOutcome::ok(data);
    Ok(if fatal { outcome.with_exit_code(2) } else { outcome })
}
