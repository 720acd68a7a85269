//! Process-wide provider health.
//!
//! One [`CircuitBreaker`] plus a rate-limit quarantine per provider. The
//! tracker is built once, shared through an `Arc`, and injected into the
//! router; nothing here is global.
//!
//! Rate limiting is independent of the breaker: a rate-limit outcome quarantines
//! the provider immediately for its window and never counts as a failure.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState, Transition};
use crate::clock::{duration_ms, format_epoch_ms, Clock};

/// Default quarantine after an explicit rate-limit response.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Per-provider health settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit_window: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
        }
    }
}

/// Why a provider is or is not eligible right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// Admitted as the half-open trial call.
    Probe,
    CircuitOpen { retry_at_ms: i64 },
    ProbeInFlight,
    RateLimited { until_ms: i64 },
}

impl Availability {
    pub const fn admits(self) -> bool {
        matches!(self, Self::Available | Self::Probe)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Probe => "probe",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::ProbeInFlight => "probe_in_flight",
            Self::RateLimited { .. } => "rate_limited",
        }
    }
}

#[derive(Debug)]
struct ProviderHealth {
    config: HealthConfig,
    breaker: CircuitBreaker,
    rate_limited_until_ms: Option<i64>,
    total_failures: u64,
    total_successes: u64,
    rate_limit_hits: u64,
}

impl ProviderHealth {
    fn new(config: HealthConfig) -> Self {
        Self {
            config,
            breaker: CircuitBreaker::new(config.circuit_breaker),
            rate_limited_until_ms: None,
            total_failures: 0,
            total_successes: 0,
            rate_limit_hits: 0,
        }
    }

    fn quarantined_until(&self, now_ms: i64) -> Option<i64> {
        self.rate_limited_until_ms.filter(|until| now_ms < *until)
    }
}

/// Diagnostic view of one provider's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealthSnapshot {
    pub provider_id: String,
    pub circuit_state: CircuitState,
    pub available: bool,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub opened_at: Option<String>,
    pub rate_limited_until: Option<String>,
    pub reopen_count: u32,
    pub current_cooldown_ms: i64,
    pub probe_in_flight: bool,
    pub total_failures: u64,
    pub total_successes: u64,
    pub rate_limit_hits: u64,
}

/// Thread-safe registry of provider health states.
#[derive(Debug)]
pub struct ProviderHealthTracker {
    clock: Arc<dyn Clock>,
    providers: Mutex<BTreeMap<String, ProviderHealth>>,
}

impl ProviderHealthTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            providers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create state for `provider_id`. Existing state is left untouched.
    pub fn register(&self, provider_id: &str, config: HealthConfig) {
        let mut providers = self.lock();
        providers
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderHealth::new(config));
    }

    /// Ask whether `provider_id` may be called now.
    ///
    /// Quarantine is checked first and never mutates anything. An open circuit
    /// whose cool-down elapsed is moved to half-open and the caller gets the
    /// single trial slot.
    pub fn check(&self, provider_id: &str) -> Availability {
        let now_ms = self.clock.now_ms();
        let mut providers = self.lock();
        let health = Self::entry(&mut providers, provider_id);

        if let Some(until_ms) = health.quarantined_until(now_ms) {
            return Availability::RateLimited { until_ms };
        }

        let (admission, transition) = health.breaker.admit(now_ms);
        if let Some(transition) = transition {
            log_transition(provider_id, transition);
        }

        match admission {
            Admission::Pass => Availability::Available,
            Admission::Probe => Availability::Probe,
            Admission::Reject { retry_at_ms } => Availability::CircuitOpen { retry_at_ms },
            Admission::ProbeInFlight => Availability::ProbeInFlight,
        }
    }

    pub fn record_success(&self, provider_id: &str) {
        let mut providers = self.lock();
        let health = Self::entry(&mut providers, provider_id);
        health.total_successes = health.total_successes.saturating_add(1);
        if let Some(transition) = health.breaker.record_success() {
            log_transition(provider_id, transition);
        }
    }

    /// Generic failure (error response, transport error, timeout).
    pub fn record_failure(&self, provider_id: &str) {
        let now_ms = self.clock.now_ms();
        let mut providers = self.lock();
        let health = Self::entry(&mut providers, provider_id);
        health.total_failures = health.total_failures.saturating_add(1);
        if let Some(transition) = health.breaker.record_failure(now_ms) {
            log_transition(provider_id, transition);
        }
    }

    /// Quarantine `provider_id` for its rate-limit window.
    pub fn record_rate_limited(&self, provider_id: &str) {
        let now_ms = self.clock.now_ms();
        let mut providers = self.lock();
        let health = Self::entry(&mut providers, provider_id);
        let until_ms = now_ms.saturating_add(duration_ms(health.config.rate_limit_window));

        health.rate_limited_until_ms = Some(until_ms);
        health.rate_limit_hits = health.rate_limit_hits.saturating_add(1);
        health.breaker.release_probe();
        info!(
            provider = provider_id,
            window_ms = duration_ms(health.config.rate_limit_window),
            "provider rate limited; quarantined"
        );
    }

    /// Hold the half-open trial slot of `provider_id` until an outcome is
    /// recorded. Dropping the guard while still armed gives the slot back.
    pub fn probe_guard<'a>(&'a self, provider_id: &'a str) -> ProbeGuard<'a> {
        ProbeGuard {
            tracker: self,
            provider_id,
            armed: true,
        }
    }

    /// Free an abandoned trial slot; the circuit stays half-open.
    pub fn release_probe(&self, provider_id: &str) {
        let mut providers = self.lock();
        let health = Self::entry(&mut providers, provider_id);
        if health.breaker.probe_in_flight() {
            health.breaker.release_probe();
            info!(provider = provider_id, "half-open probe abandoned; slot released");
        }
    }

    pub fn snapshot(&self, provider_id: &str) -> Option<ProviderHealthSnapshot> {
        let now_ms = self.clock.now_ms();
        let providers = self.lock();
        providers
            .get(provider_id)
            .map(|health| build_snapshot(provider_id, health, now_ms))
    }

    /// Every registered provider, ordered by id.
    pub fn snapshots(&self) -> Vec<ProviderHealthSnapshot> {
        let now_ms = self.clock.now_ms();
        let providers = self.lock();
        providers
            .iter()
            .map(|(provider_id, health)| build_snapshot(provider_id, health, now_ms))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ProviderHealth>> {
        self.providers
            .lock()
            .expect("provider health lock is not poisoned")
    }

    fn entry<'a>(
        providers: &'a mut BTreeMap<String, ProviderHealth>,
        provider_id: &str,
    ) -> &'a mut ProviderHealth {
        providers
            .entry(provider_id.to_string())
            .or_insert_with(|| ProviderHealth::new(HealthConfig::default()))
    }
}

/// Trial slot handed to the caller admitted with [`Availability::Probe`].
#[must_use = "dropping the guard releases the probe slot immediately"]
pub struct ProbeGuard<'a> {
    tracker: &'a ProviderHealthTracker,
    provider_id: &'a str,
    armed: bool,
}

impl ProbeGuard<'_> {
    /// Keep the slot accounting to the recorded outcome.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.tracker.release_probe(self.provider_id);
        }
    }
}

fn build_snapshot(provider_id: &str, health: &ProviderHealth, now_ms: i64) -> ProviderHealthSnapshot {
    let breaker = &health.breaker;
    ProviderHealthSnapshot {
        provider_id: provider_id.to_string(),
        circuit_state: breaker.state(),
        available: health.quarantined_until(now_ms).is_none() && breaker.would_admit(now_ms),
        consecutive_failures: breaker.consecutive_failures(),
        failure_threshold: breaker.config().failure_threshold,
        opened_at: breaker.opened_at_ms().and_then(format_epoch_ms),
        rate_limited_until: health.quarantined_until(now_ms).and_then(format_epoch_ms),
        reopen_count: breaker.reopen_count(),
        current_cooldown_ms: duration_ms(breaker.current_cooldown()),
        probe_in_flight: breaker.probe_in_flight(),
        total_failures: health.total_failures,
        total_successes: health.total_successes,
        rate_limit_hits: health.rate_limit_hits,
    }
}

fn log_transition(provider_id: &str, transition: Transition) {
    match transition {
        Transition::Opened { cooldown } => {
            info!(provider = provider_id, cooldown_ms = duration_ms(cooldown), "circuit opened");
        }
        Transition::Reopened {
            cooldown,
            reopen_count,
        } => {
            info!(
                provider = provider_id,
                cooldown_ms = duration_ms(cooldown),
                reopen_count,
                "half-open probe failed; circuit re-opened"
            );
        }
        Transition::HalfOpened => info!(provider = provider_id, "circuit half-open; admitting probe"),
        Transition::Closed => info!(provider = provider_id, "circuit closed"),
    }
}
