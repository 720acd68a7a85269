//! Behavior-driven tests for provider health tracking.
//!
//! Covers the circuit breaker lifecycle and rate-limit quarantine.

use std::sync::Arc;
use std::time::Duration;

use tickguard_core::{
    Availability, CircuitBreakerConfig, CircuitState, HealthConfig, ManualClock,
    ProviderHealthTracker,
};

const COOLDOWN: Duration = Duration::from_secs(30);

fn tracker() -> (Arc<ManualClock>, ProviderHealthTracker) {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let tracker = ProviderHealthTracker::new(clock.clone());
    tracker.register(
        "finnhub",
        HealthConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 3,
                cooldown: COOLDOWN,
                max_cooldown: Duration::from_secs(600),
            },
            rate_limit_window: Duration::from_secs(60),
        },
    );
    (clock, tracker)
}

fn state(tracker: &ProviderHealthTracker) -> CircuitState {
    tracker
        .snapshot("finnhub")
        .expect("registered provider")
        .circuit_state
}

// =============================================================================
// Circuit Breaker Lifecycle
// =============================================================================

#[test]
fn when_failures_reach_threshold_the_circuit_opens() {
    // Given: A healthy provider
    let (_clock, tracker) = tracker();

    // When: Two failures are recorded
    tracker.record_failure("finnhub");
    tracker.record_failure("finnhub");

    // Then: It is still closed and callable
    assert_eq!(state(&tracker), CircuitState::Closed);
    assert_eq!(tracker.check("finnhub"), Availability::Available);

    // When: The third failure lands
    tracker.record_failure("finnhub");

    // Then: The circuit is open and calls are rejected
    assert_eq!(state(&tracker), CircuitState::Open);
    assert!(matches!(
        tracker.check("finnhub"),
        Availability::CircuitOpen { .. }
    ));
}

#[test]
fn a_success_resets_the_failure_count() {
    let (_clock, tracker) = tracker();

    tracker.record_failure("finnhub");
    tracker.record_failure("finnhub");
    tracker.record_success("finnhub");
    tracker.record_failure("finnhub");

    let snapshot = tracker.snapshot("finnhub").expect("snapshot");
    assert_eq!(snapshot.circuit_state, CircuitState::Closed);
    assert_eq!(snapshot.consecutive_failures, 1);
}

#[test]
fn after_cooldown_the_next_check_becomes_a_half_open_probe() {
    // Given: An open circuit
    let (clock, tracker) = tracker();
    for _ in 0..3 {
        tracker.record_failure("finnhub");
    }

    // When: The cool-down has not quite elapsed
    clock.advance(COOLDOWN - Duration::from_millis(1));

    // Then: Calls are still rejected
    assert!(matches!(
        tracker.check("finnhub"),
        Availability::CircuitOpen { .. }
    ));

    // When: The cool-down elapses
    clock.advance(Duration::from_millis(1));

    // Then: The first caller gets the probe and the circuit is half-open
    assert_eq!(tracker.check("finnhub"), Availability::Probe);
    assert_eq!(state(&tracker), CircuitState::HalfOpen);
}

#[test]
fn only_one_probe_is_admitted_while_half_open() {
    // Given: A circuit that just went half-open
    let (clock, tracker) = tracker();
    for _ in 0..3 {
        tracker.record_failure("finnhub");
    }
    clock.advance(COOLDOWN);
    assert_eq!(tracker.check("finnhub"), Availability::Probe);

    // When: A concurrent caller checks
    let second = tracker.check("finnhub");

    // Then: It is turned away until the probe resolves
    assert_eq!(second, Availability::ProbeInFlight);
    assert!(!second.admits());
}

#[test]
fn a_successful_probe_closes_the_circuit() {
    let (clock, tracker) = tracker();
    for _ in 0..3 {
        tracker.record_failure("finnhub");
    }
    clock.advance(COOLDOWN);
    assert_eq!(tracker.check("finnhub"), Availability::Probe);

    tracker.record_success("finnhub");

    let snapshot = tracker.snapshot("finnhub").expect("snapshot");
    assert_eq!(snapshot.circuit_state, CircuitState::Closed);
    assert_eq!(snapshot.consecutive_failures, 0);
    assert_eq!(snapshot.reopen_count, 0);
    assert_eq!(tracker.check("finnhub"), Availability::Available);
}

#[test]
fn failed_probes_reopen_with_a_doubled_cooldown() {
    // Given: An open circuit whose first probe fails
    let (clock, tracker) = tracker();
    for _ in 0..3 {
        tracker.record_failure("finnhub");
    }
    clock.advance(COOLDOWN);
    assert_eq!(tracker.check("finnhub"), Availability::Probe);
    tracker.record_failure("finnhub");

    // Then: The circuit reopened with twice the cool-down
    let snapshot = tracker.snapshot("finnhub").expect("snapshot");
    assert_eq!(snapshot.circuit_state, CircuitState::Open);
    assert_eq!(snapshot.reopen_count, 1);
    assert_eq!(snapshot.current_cooldown_ms, 60_000);

    // When: Only the original cool-down passes
    clock.advance(COOLDOWN);

    // Then: The provider is still rejected
    assert!(matches!(
        tracker.check("finnhub"),
        Availability::CircuitOpen { .. }
    ));

    // When: The doubled cool-down passes
    clock.advance(COOLDOWN);

    // Then: A new probe is allowed
    assert_eq!(tracker.check("finnhub"), Availability::Probe);
}

// =============================================================================
// Rate-Limit Quarantine
// =============================================================================

#[test]
fn rate_limited_provider_is_excluded_for_exactly_the_window() {
    // Given: A rate limit recorded at T with a 60s window
    let (clock, tracker) = tracker();
    tracker.record_rate_limited("finnhub");

    // Then: It is excluded just before T+W
    clock.advance(Duration::from_millis(59_999));
    assert!(matches!(
        tracker.check("finnhub"),
        Availability::RateLimited { .. }
    ));

    // And: It is eligible again at T+W
    clock.advance(Duration::from_millis(1));
    assert_eq!(tracker.check("finnhub"), Availability::Available);
}

#[test]
fn rate_limits_do_not_count_toward_the_breaker() {
    let (clock, tracker) = tracker();

    for _ in 0..5 {
        tracker.record_rate_limited("finnhub");
    }
    clock.advance(Duration::from_secs(60));

    let snapshot = tracker.snapshot("finnhub").expect("snapshot");
    assert_eq!(snapshot.circuit_state, CircuitState::Closed);
    assert_eq!(snapshot.consecutive_failures, 0);
    assert_eq!(snapshot.rate_limit_hits, 5);
}

#[test]
fn quarantine_applies_even_when_the_circuit_is_closed() {
    let (_clock, tracker) = tracker();
    tracker.record_rate_limited("finnhub");

    let snapshot = tracker.snapshot("finnhub").expect("snapshot");
    assert_eq!(snapshot.circuit_state, CircuitState::Closed);
    assert!(!snapshot.available);
    assert!(snapshot.rate_limited_until.is_some());
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn unknown_providers_start_healthy() {
    let (_clock, tracker) = tracker();

    assert_eq!(tracker.check("alphavantage"), Availability::Available);
    let ids: Vec<String> = tracker
        .snapshots()
        .into_iter()
        .map(|snapshot| snapshot.provider_id)
        .collect();
    assert_eq!(ids, vec!["alphavantage", "finnhub"]);
}
