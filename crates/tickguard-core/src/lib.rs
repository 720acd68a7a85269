//! # Tickguard Core
//!
//! Resilient data-access layer for market-data providers.
//!
//! ## Overview
//!
//! - **Entry cache** (L1 in-process memory or L2 Redis) with per-entry TTL,
//!   age tracking and a stale-retention window
//! - **Artifact store** (L3 DuckDB) for expensive, versioned results
//! - **Provider health tracking**: circuit breaker per provider plus
//!   rate-limit cooldowns
//! - **Fallback router** that walks providers in priority order and serves
//!   stale cache data when every provider is down
//! - **Startup validation** of credentials and cache backend
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`artifacts`] | Async, failure-absorbing facade over the warehouse |
//! | [`cache`] | Entry cache and its memory/Redis backends |
//! | [`circuit_breaker`] | Per-provider closed/open/half-open state machine |
//! | [`clock`] | Injectable wall clock |
//! | [`config`] | Environment configuration and validation |
//! | [`health`] | Provider health tracker |
//! | [`keys`] | Capabilities and cache key construction |
//! | [`provider`] | Provider trait and HTTP JSON adapter |
//! | [`routing`] | Cache-first fallback router |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Caller   │
//! └────────┬────────┘
//!          │ resolve(capability, identifier)
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Provider Router │────▶│  Entry Cache     │
//! └────────┬────────┘     │ (memory / redis) │
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Health Tracker  │────▶│ Circuit Breaker  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Data Provider   │────▶│ HTTP Client      │
//! │ (trait)         │     │ (reqwest)        │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Cache failures never reach callers: they are logged and reported as
//! misses. Routing failures are typed:
//!
//! ```rust
//! use tickguard_core::RouteError;
//!
//! fn describe(error: &RouteError) -> &'static str {
//!     match error {
//!         RouteError::AllProvidersUnavailable { .. } => "retry later",
//!         RouteError::NoProvidersConfigured(_) => "configure a provider",
//!         RouteError::InvalidIdentifier(_) => "fix the request",
//!         RouteError::Decode { .. } => "report upstream format change",
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - API keys are read from environment variables only and never logged
//! - Redis URLs are redacted before being displayed

pub mod artifacts;
pub mod cache;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod health;
pub mod keys;
pub mod provider;
pub mod routing;

// Artifact store
pub use artifacts::ArtifactStore;

// Entry cache
pub use cache::{
    CacheBackend, CacheBackendConfig, CacheBackendKind, CacheError, CacheStats, EntryCache,
    MemoryBackend, RedisBackend, StaleValue, StoredEntry,
};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Clock
pub use clock::{Clock, ManualClock, SystemClock};

// Configuration
pub use config::{
    AppConfig, CacheProviderDetails, ConfigError, ProviderConfig, RuntimeMode, ValidationReport,
};

// Health
pub use health::{
    Availability, HealthConfig, ProbeGuard, ProviderHealthSnapshot, ProviderHealthTracker,
};

// Keys
pub use keys::{cache_key, normalize_identifier, Capability, InvalidIdentifier};

// Providers
pub use provider::http::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use provider::{
    CredentialPlacement, DataProvider, FnProvider, HttpJsonProvider, HttpProviderSpec,
    ProviderError, ProviderErrorKind,
};

// Routing
pub use routing::{
    Attempt, AttemptOutcome, ProviderRouter, ProviderRouterBuilder, Resolution, ResolutionSource,
    RouteError, RouteSettings,
};

// Warehouse (re-exported from tickguard-warehouse)
pub use tickguard_warehouse::{
    AccountTier, ArtifactKind, CompanyProfile, CompanyProfileDraft, FilingKey, FilingSummary,
    FilingSummaryDraft, IsoDate, NewsSentimentDraft, NewsSentimentRecord, TtlPolicy, Warehouse,
    WarehouseConfig, WarehouseError,
};
