//! Startup configuration validation.
//!
//! Fatal in production, advisory in development.

use serde::Serialize;
use tracing::{error, info, warn};

use super::{AppConfig, ConfigError, RuntimeMode};
use crate::keys::Capability;

/// Structured validation result consumed by process bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
}

impl ValidationReport {
    /// Production with errors is fatal; development only logs.
    ///
    /// # Errors
    /// Returns [`ConfigError::StartupValidation`] when `mode` is production
    /// and validation produced errors.
    pub fn enforce(&self, mode: RuntimeMode) -> Result<(), ConfigError> {
        for warning in &self.warnings {
            warn!(%warning, "configuration warning");
        }

        if self.errors.is_empty() {
            return Ok(());
        }

        match mode {
            RuntimeMode::Production => {
                for message in &self.errors {
                    error!(%message, "configuration error");
                }
                Err(ConfigError::StartupValidation {
                    errors: self.errors.clone(),
                })
            }
            RuntimeMode::Development => {
                for message in &self.errors {
                    warn!(%message, "configuration error (continuing in development mode)");
                }
                Ok(())
            }
        }
    }
}

/// Check credentials, per-capability coverage and the cache backend.
pub fn validate(config: &AppConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    for provider in &config.providers {
        if provider.enabled {
            report.info.push(format!(
                "provider '{}' enabled for {}",
                provider.name,
                join_capabilities(&provider.capabilities)
            ));
            continue;
        }

        let message = format!(
            "missing credential for provider '{}': set {}",
            provider.name,
            provider.credential_env.join(" or ")
        );
        if provider.required {
            report.errors.push(message);
        } else {
            report.warnings.push(message);
        }
    }

    for capability in Capability::ALL {
        if config.enabled_providers(capability).is_empty() {
            report
                .errors
                .push(format!("no enabled provider for capability '{capability}'"));
        }
    }

    let cache = config.cache_provider_details();
    if cache.shared {
        report.info.push(format!(
            "cache backend: {} at {}",
            cache.kind.as_str(),
            cache.location
        ));
    } else if config.mode == RuntimeMode::Production {
        report.errors.push(String::from(
            "production requires a networked cache: set TICKGUARD_REDIS_URL or REDIS_URL",
        ));
    } else {
        report.warnings.push(String::from(
            "using in-process memory cache; entries are not shared between instances",
        ));
    }

    report.info.push(format!(
        "artifact store: {}",
        config.warehouse.db_path.display()
    ));
    report.info.push(format!("mode: {}", config.mode.as_str()));

    report.success = report.errors.is_empty();
    info!(
        success = report.success,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "configuration validated"
    );
    report
}

fn join_capabilities(capabilities: &[Capability]) -> String {
    capabilities
        .iter()
        .map(|capability| capability.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
