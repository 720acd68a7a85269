//! Capability routing with cache, fallback and stale last resort.
//!
//! ```text
//! resolve(capability, identifier)
//!   -> EntryCache::get                      hit: Cache
//!   -> providers in priority order
//!        skip disabled / open / probing / rate-limited
//!        timeout(provider.fetch)            ok: write back, Provider(id)
//!        (a dropped half-open probe gives its slot back)
//!        record failure or quarantine       next
//!   -> EntryCache::get_stale                StaleCache (stale = true)
//!   -> RouteError::AllProvidersUnavailable
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cache::EntryCache;
use crate::clock::duration_ms;
use crate::health::{Availability, HealthConfig, ProviderHealthSnapshot, ProviderHealthTracker};
use crate::keys::{cache_key, normalize_identifier, Capability, InvalidIdentifier};
use crate::provider::{DataProvider, ProviderError, ProviderErrorKind};

/// Default hard timeout for one provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    Provider(String),
    StaleCache,
}

impl Serialize for ResolutionSource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Cache => serializer.serialize_str("cache"),
            Self::Provider(id) => serializer.serialize_str(&format!("provider:{id}")),
            Self::StaleCache => serializer.serialize_str("stale_cache"),
        }
    }
}

/// Result of one provider in a routed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum AttemptOutcome {
    Succeeded,
    Failed(String),
    RateLimited(String),
    TimedOut,
    /// Not called: disabled, open, probing or quarantined.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
}

/// Successfully resolved value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution<T = Value> {
    pub capability: Capability,
    pub identifier: String,
    pub value: T,
    pub source: ResolutionSource,
    pub stale: bool,
    /// Age of the cached value; zero for fresh provider results.
    #[serde(rename = "age_ms", serialize_with = "serialize_duration_ms")]
    pub age: Duration,
    pub attempts: Vec<Attempt>,
}

fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_i64(duration_ms(*duration))
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("all providers unavailable for {capability} '{identifier}' ({} attempt(s))", .attempts.len())]
    AllProvidersUnavailable {
        capability: Capability,
        identifier: String,
        attempts: Vec<Attempt>,
    },

    #[error("no providers configured for {0}")]
    NoProvidersConfigured(Capability),

    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    #[error("{capability} value for '{identifier}' has an unexpected shape: {message}")]
    Decode {
        capability: Capability,
        identifier: String,
        message: String,
    },
}

/// Per-provider routing settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSettings {
    pub enabled: bool,
    pub timeout: Duration,
    pub health: HealthConfig,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
            health: HealthConfig::default(),
        }
    }
}

struct RouteEntry {
    provider: Arc<dyn DataProvider>,
    settings: RouteSettings,
}

/// Builder for [`ProviderRouter`].
pub struct ProviderRouterBuilder {
    cache: EntryCache,
    health: Arc<ProviderHealthTracker>,
    routes: BTreeMap<Capability, Vec<RouteEntry>>,
    ttls: BTreeMap<Capability, Duration>,
}

impl ProviderRouterBuilder {
    /// Append `provider` to the priority list of `capability`.
    pub fn route(
        mut self,
        capability: Capability,
        provider: Arc<dyn DataProvider>,
        settings: RouteSettings,
    ) -> Self {
        self.health.register(provider.id(), settings.health);
        self.routes
            .entry(capability)
            .or_default()
            .push(RouteEntry { provider, settings });
        self
    }

    /// L1/L2 TTL used when writing back a provider result.
    pub fn ttl(mut self, capability: Capability, ttl: Duration) -> Self {
        self.ttls.insert(capability, ttl);
        self
    }

    pub fn build(self) -> ProviderRouter {
        ProviderRouter {
            cache: self.cache,
            health: self.health,
            routes: self.routes,
            ttls: self.ttls,
        }
    }
}

/// Capability router.
pub struct ProviderRouter {
    cache: EntryCache,
    health: Arc<ProviderHealthTracker>,
    routes: BTreeMap<Capability, Vec<RouteEntry>>,
    ttls: BTreeMap<Capability, Duration>,
}

impl ProviderRouter {
    pub fn builder(cache: EntryCache, health: Arc<ProviderHealthTracker>) -> ProviderRouterBuilder {
        ProviderRouterBuilder {
            cache,
            health,
            routes: BTreeMap::new(),
            ttls: BTreeMap::new(),
        }
    }

    pub fn cache(&self) -> &EntryCache {
        &self.cache
    }

    pub fn health(&self) -> &Arc<ProviderHealthTracker> {
        &self.health
    }

    /// TTL applied to provider results for `capability`.
    pub fn ttl_for(&self, capability: Capability) -> Duration {
        self.ttls
            .get(&capability)
            .copied()
            .unwrap_or(Duration::from_secs(60))
    }

    /// Provider ids for `capability` in priority order, with their enabled flag.
    pub fn providers_for(&self, capability: Capability) -> Vec<(String, bool)> {
        self.routes
            .get(&capability)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| (entry.provider.id().to_string(), entry.settings.enabled))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Health of every registered provider.
    pub fn provider_snapshots(&self) -> Vec<ProviderHealthSnapshot> {
        self.health.snapshots()
    }

    pub async fn resolve(
        &self,
        capability: Capability,
        identifier: &str,
    ) -> Result<Resolution, RouteError> {
        let identifier = normalize_identifier(capability, identifier)?;
        let key = cache_key(capability, &identifier)?;

        if let Some(value) = self.cache.get::<Value>(&key).await {
            let age = self.cache.age(&key).await.unwrap_or_default();
            return Ok(Resolution {
                capability,
                identifier,
                value,
                source: ResolutionSource::Cache,
                stale: false,
                age,
                attempts: Vec::new(),
            });
        }

        let entries = self
            .routes
            .get(&capability)
            .filter(|entries| !entries.is_empty())
            .ok_or(RouteError::NoProvidersConfigured(capability))?;

        let mut attempts = Vec::with_capacity(entries.len());
        for entry in entries {
            let provider_id = entry.provider.id();

            if !entry.settings.enabled {
                attempts.push(skipped(provider_id, "disabled"));
                continue;
            }

            let availability = self.health.check(provider_id);
            if !availability.admits() {
                debug!(provider = provider_id, %capability, reason = availability.label(), "provider skipped");
                attempts.push(skipped(provider_id, availability.label()));
                continue;
            }
            let probe = (availability == Availability::Probe).then(|| {
                debug!(provider = provider_id, %capability, "sending half-open probe");
                self.health.probe_guard(provider_id)
            });

            let result = self.call(entry, capability, &identifier).await;
            // The outcome below settles the slot; no await point before it.
            if let Some(probe) = probe {
                probe.disarm();
            }

            match result {
                Ok(value) => {
                    self.health.record_success(provider_id);
                    self.cache.set(&key, &value, self.ttl_for(capability)).await;
                    attempts.push(Attempt {
                        provider: provider_id.to_string(),
                        outcome: AttemptOutcome::Succeeded,
                    });
                    return Ok(Resolution {
                        capability,
                        identifier,
                        value,
                        source: ResolutionSource::Provider(provider_id.to_string()),
                        stale: false,
                        age: Duration::ZERO,
                        attempts,
                    });
                }
                Err(error) => {
                    warn!(provider = provider_id, %capability, identifier = %identifier, %error, "provider call failed");
                    let outcome = match error.kind() {
                        ProviderErrorKind::RateLimited => {
                            self.health.record_rate_limited(provider_id);
                            AttemptOutcome::RateLimited(error.message().to_string())
                        }
                        ProviderErrorKind::Timeout => {
                            self.health.record_failure(provider_id);
                            AttemptOutcome::TimedOut
                        }
                        ProviderErrorKind::Generic => {
                            self.health.record_failure(provider_id);
                            AttemptOutcome::Failed(error.message().to_string())
                        }
                    };
                    attempts.push(Attempt {
                        provider: provider_id.to_string(),
                        outcome,
                    });
                }
            }
        }

        if let Some(stale) = self.cache.get_stale::<Value>(&key).await {
            warn!(%capability, identifier = %identifier, age_ms = duration_ms(stale.age), "serving stale value");
            return Ok(Resolution {
                capability,
                identifier,
                value: stale.value,
                source: ResolutionSource::StaleCache,
                stale: true,
                age: stale.age,
                attempts,
            });
        }

        Err(RouteError::AllProvidersUnavailable {
            capability,
            identifier,
            attempts,
        })
    }

    /// [`ProviderRouter::resolve`] with the value decoded into `T`.
    pub async fn resolve_as<T: DeserializeOwned>(
        &self,
        capability: Capability,
        identifier: &str,
    ) -> Result<Resolution<T>, RouteError> {
        let resolution = self.resolve(capability, identifier).await?;
        let value = serde_json::from_value(resolution.value).map_err(|error| RouteError::Decode {
            capability,
            identifier: resolution.identifier.clone(),
            message: error.to_string(),
        })?;

        Ok(Resolution {
            capability: resolution.capability,
            identifier: resolution.identifier,
            value,
            source: resolution.source,
            stale: resolution.stale,
            age: resolution.age,
            attempts: resolution.attempts,
        })
    }

    async fn call(
        &self,
        entry: &RouteEntry,
        capability: Capability,
        identifier: &str,
    ) -> Result<Value, ProviderError> {
        let limit = entry.settings.timeout;
        match timeout(limit, entry.provider.fetch(capability, identifier)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(format!(
                "no response within {} ms",
                duration_ms(limit)
            ))),
        }
    }
}

fn skipped(provider_id: &str, reason: &str) -> Attempt {
    Attempt {
        provider: provider_id.to_string(),
        outcome: AttemptOutcome::Skipped(reason.to_string()),
    }
}
