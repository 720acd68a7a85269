use std::sync::Arc;

use serde::Serialize;
use tickguard_core::{AppConfig, Capability, Clock, ProviderHealthSnapshot, ReqwestHttpClient};

use crate::error::CliError;

use super::CommandOutcome;

#[derive(Debug, Serialize)]
struct ProviderEntry {
    name: String,
    enabled: bool,
    required: bool,
    capabilities: Vec<Capability>,
    endpoint: String,
    credential_env: Vec<String>,
    timeout_ms: u128,
    health: Option<ProviderHealthSnapshot>,
}

#[derive(Debug, Serialize)]
struct RouteEntry {
    capability: Capability,
    providers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ProvidersData {
    providers: Vec<ProviderEntry>,
    routes: Vec<RouteEntry>,
}

pub fn run(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<CommandOutcome, CliError> {
    let router = config.build_router(clock, Arc::new(ReqwestHttpClient::new()))?;

    let providers = config
        .providers
        .iter()
        .map(|provider| ProviderEntry {
            name: provider.name.clone(),
            enabled: provider.enabled,
            required: provider.required,
            capabilities: provider.capabilities.clone(),
            endpoint: provider.endpoint.clone(),
            credential_env: provider.credential_env.clone(),
            timeout_ms: provider.timeout.as_millis(),
            health: router.health().snapshot(&provider.name),
        })
        .collect();

    let routes = Capability::ALL
        .into_iter()
        .map(|capability| RouteEntry {
            capability,
            providers: router
                .providers_for(capability)
                .into_iter()
                .filter(|(_, enabled)| *enabled)
                .map(|(name, _)| name)
                .collect(),
        })
        .collect();

    let data = serde_json::to_value(ProvidersData { providers, routes })?;
    Ok(CommandOutcome::ok(data))
}
