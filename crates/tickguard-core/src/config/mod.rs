//! Application configuration.
//!
//! [`AppConfig`] is read from the environment once at startup and then passed
//! by reference. It decides the cache backend, which providers are enabled
//! (credential present) and their routing order.
//!
//! # Environment Variables
//!
//! | Variable | Fallback | Default |
//! |----------|----------|---------|
//! | `TICKGUARD_ENV` | `APP_ENV` | `development` |
//! | `TICKGUARD_REDIS_URL` | `REDIS_URL` | in-memory cache |
//! | `TICKGUARD_CACHE_NAMESPACE` | - | `tickguard` |
//! | `TICKGUARD_HOME` | `$HOME/.tickguard` | `.tickguard` |
//! | `TICKGUARD_WAREHOUSE_PATH` | - | `$TICKGUARD_HOME/artifacts.duckdb` |
//! | `TICKGUARD_PROVIDER_TIMEOUT_MS` | - | `5000` |
//! | `TICKGUARD_<PROVIDER>_API_KEY` | `<PROVIDER>_API_KEY` | provider disabled |

pub mod catalog;
pub mod validation;

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tickguard_warehouse::{TtlPolicy, Warehouse, WarehouseConfig, WarehouseError};

use crate::artifacts::ArtifactStore;
use crate::cache::{
    memory::DEFAULT_MAX_ENTRIES, redact_url, CacheBackendConfig, CacheBackendKind, CacheError,
    EntryCache, DEFAULT_STALE_RETENTION,
};
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::clock::{duration_ms, Clock};
use crate::health::{HealthConfig, ProviderHealthTracker, DEFAULT_RATE_LIMIT_WINDOW};
use crate::keys::Capability;
use crate::provider::http::HttpClient;
use crate::provider::{DataProvider, HttpJsonProvider};
use crate::routing::{ProviderRouter, RouteSettings, DEFAULT_PROVIDER_TIMEOUT};

pub use self::validation::{validate, ValidationReport};

const DEFAULT_NAMESPACE: &str = "tickguard";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}' ({message})")]
    InvalidValue {
        name: &'static str,
        value: String,
        message: String,
    },

    #[error("startup validation failed: {}", .errors.join("; "))]
    StartupValidation { errors: Vec<String> },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// Deployment mode; decides whether validation failures are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    #[default]
    Development,
    Production,
}

impl RuntimeMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl FromStr for RuntimeMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "local" | "test" => Ok(Self::Development),
            _ => Err(String::from("expected 'production' or 'development'")),
        }
    }
}

/// One provider as configured for routing.
#[derive(Clone)]
pub struct ProviderConfig {
    pub name: String,
    /// Derived from credential presence.
    pub enabled: bool,
    pub required: bool,
    pub capabilities: Vec<Capability>,
    pub timeout: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit_window: Duration,
    pub credential_env: Vec<String>,
    pub endpoint: String,
    api_key: Option<String>,
}

impl ProviderConfig {
    pub fn route_settings(&self) -> RouteSettings {
        RouteSettings {
            enabled: self.enabled,
            timeout: self.timeout,
            health: HealthConfig {
                circuit_breaker: self.circuit_breaker,
                rate_limit_window: self.rate_limit_window,
            },
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self.enabled = true;
        self
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("required", &self.required)
            .field("capabilities", &self.capabilities)
            .field("timeout", &self.timeout)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("credential_env", &self.credential_env)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Diagnostic description of the selected L1/L2 backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheProviderDetails {
    #[serde(rename = "type")]
    pub kind: CacheBackendKind,
    /// Visible to other instances.
    pub shared: bool,
    pub location: String,
    pub namespace: Option<String>,
    pub max_entries: Option<usize>,
    pub stale_retention_ms: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RuntimeMode,
    pub cache_backend: CacheBackendConfig,
    pub stale_retention: Duration,
    /// L1/L2 TTL per capability.
    pub cache_ttls: BTreeMap<Capability, Duration>,
    pub provider_timeout: Duration,
    pub providers: Vec<ProviderConfig>,
    /// Provider names per capability, highest priority first.
    pub routes: BTreeMap<Capability, Vec<String>>,
    pub warehouse: WarehouseConfig,
}

impl AppConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = match first_set(&lookup, &["TICKGUARD_ENV", "APP_ENV"]) {
            Some(raw) => raw.parse::<RuntimeMode>().map_err(|message| ConfigError::InvalidValue {
                name: "TICKGUARD_ENV",
                value: raw.clone(),
                message,
            })?,
            None => RuntimeMode::default(),
        };

        let cache_backend = match first_set(&lookup, &["TICKGUARD_REDIS_URL", "REDIS_URL"]) {
            Some(url) => CacheBackendConfig::Redis {
                url,
                namespace: first_set(&lookup, &["TICKGUARD_CACHE_NAMESPACE"])
                    .unwrap_or_else(|| String::from(DEFAULT_NAMESPACE)),
            },
            None => CacheBackendConfig::Memory {
                max_entries: DEFAULT_MAX_ENTRIES,
            },
        };

        let provider_timeout = match first_set(&lookup, &["TICKGUARD_PROVIDER_TIMEOUT_MS"]) {
            Some(raw) => parse_timeout_ms(&raw)?,
            None => DEFAULT_PROVIDER_TIMEOUT,
        };

        let home = first_set(&lookup, &["TICKGUARD_HOME"])
            .map(PathBuf::from)
            .or_else(|| first_set(&lookup, &["HOME"]).map(|home| PathBuf::from(home).join(".tickguard")))
            .unwrap_or_else(|| PathBuf::from(".tickguard"));
        let db_path = first_set(&lookup, &["TICKGUARD_WAREHOUSE_PATH"])
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("artifacts.duckdb"));

        let providers: Vec<ProviderConfig> = catalog::builtin_providers()
            .into_iter()
            .map(|entry| {
                let credential_env = entry.credential_env().to_vec();
                let names: Vec<&str> = credential_env.iter().map(String::as_str).collect();
                let api_key = first_set(&lookup, &names);
                let capabilities = catalog::PRIORITY
                    .iter()
                    .filter(|(_, ids)| ids.contains(&entry.spec.id))
                    .map(|(capability, _)| *capability)
                    .collect();

                ProviderConfig {
                    name: entry.spec.id.to_string(),
                    enabled: api_key.is_some(),
                    required: entry.required,
                    capabilities,
                    timeout: provider_timeout,
                    circuit_breaker: CircuitBreakerConfig::default(),
                    rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
                    credential_env,
                    endpoint: entry.base_url.to_string(),
                    api_key,
                }
            })
            .collect();

        let routes: BTreeMap<Capability, Vec<String>> = catalog::PRIORITY
            .iter()
            .map(|(capability, ids)| {
                (*capability, ids.iter().map(|id| id.to_string()).collect())
            })
            .collect();

        Ok(Self {
            mode,
            cache_backend,
            stale_retention: DEFAULT_STALE_RETENTION,
            cache_ttls: default_cache_ttls(),
            provider_timeout,
            providers,
            routes,
            warehouse: WarehouseConfig {
                db_path,
                max_pool_size: 4,
                ttl_policy: TtlPolicy::default(),
            },
        })
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|provider| provider.name == name)
    }

    /// Enabled providers for `capability`, highest priority first.
    pub fn enabled_providers(&self, capability: Capability) -> Vec<&ProviderConfig> {
        self.routes
            .get(&capability)
            .into_iter()
            .flatten()
            .filter_map(|name| self.provider(name))
            .filter(|provider| provider.enabled)
            .collect()
    }

    pub fn cache_ttl(&self, capability: Capability) -> Duration {
        self.cache_ttls
            .get(&capability)
            .copied()
            .unwrap_or(Duration::from_secs(60))
    }

    pub fn cache_provider_details(&self) -> CacheProviderDetails {
        let stale_retention_ms = duration_ms(self.stale_retention);
        match &self.cache_backend {
            CacheBackendConfig::Memory { max_entries } => CacheProviderDetails {
                kind: CacheBackendKind::Memory,
                shared: false,
                location: String::from("in-process"),
                namespace: None,
                max_entries: Some(*max_entries),
                stale_retention_ms,
            },
            CacheBackendConfig::Redis { url, namespace } => CacheProviderDetails {
                kind: CacheBackendKind::Redis,
                shared: true,
                location: redact_url(url),
                namespace: Some(namespace.clone()),
                max_entries: None,
                stale_retention_ms,
            },
        }
    }

    pub fn build_cache(&self, clock: Arc<dyn Clock>) -> Result<EntryCache, ConfigError> {
        Ok(EntryCache::from_config(&self.cache_backend, clock)?
            .with_stale_retention(self.stale_retention))
    }

    /// Wire cache, health tracker and HTTP providers into a router.
    pub fn build_router(
        &self,
        clock: Arc<dyn Clock>,
        client: Arc<dyn HttpClient>,
    ) -> Result<ProviderRouter, ConfigError> {
        let cache = self.build_cache(Arc::clone(&clock))?;
        let health = Arc::new(ProviderHealthTracker::new(clock));
        let catalog = catalog::builtin_providers();

        let mut instances: HashMap<&str, Arc<dyn DataProvider>> = HashMap::new();
        for provider in &self.providers {
            let Some(entry) = catalog.iter().find(|entry| entry.spec.id == provider.name) else {
                continue;
            };
            instances.insert(
                provider.name.as_str(),
                Arc::new(HttpJsonProvider::new(
                    entry.spec.clone(),
                    provider.api_key.clone().unwrap_or_default(),
                    provider.timeout,
                    Arc::clone(&client),
                )),
            );
        }

        let mut builder = ProviderRouter::builder(cache, health);
        for (capability, ttl) in &self.cache_ttls {
            builder = builder.ttl(*capability, *ttl);
        }
        for (capability, names) in &self.routes {
            for name in names {
                let (Some(provider), Some(instance)) =
                    (self.provider(name), instances.get(name.as_str()))
                else {
                    continue;
                };
                builder = builder.route(*capability, Arc::clone(instance), provider.route_settings());
            }
        }

        Ok(builder.build())
    }

    pub fn open_artifact_store(&self, clock: Arc<dyn Clock>) -> Result<ArtifactStore, ConfigError> {
        let warehouse = Warehouse::open(self.warehouse.clone())?;
        Ok(ArtifactStore::new(warehouse, clock))
    }

    pub fn validate(&self) -> ValidationReport {
        validate(self)
    }
}

/// Quote 60s, fundamentals 24h, news 15min, filing 7d.
pub fn default_cache_ttls() -> BTreeMap<Capability, Duration> {
    BTreeMap::from([
        (Capability::Quote, Duration::from_secs(60)),
        (Capability::Fundamentals, Duration::from_secs(24 * 60 * 60)),
        (Capability::News, Duration::from_secs(15 * 60)),
        (Capability::Filing, Duration::from_secs(7 * 24 * 60 * 60)),
    ])
}

fn first_set<F>(lookup: &F, names: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn parse_timeout_ms(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        name: "TICKGUARD_PROVIDER_TIMEOUT_MS",
        value: raw.to_string(),
        message: message.to_string(),
    };
    let millis: u64 = raw.parse().map_err(|_| invalid("expected milliseconds"))?;
    if millis == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(Duration::from_millis(millis))
}
