use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::duration_ms;

/// Runtime circuit state for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    /// Cool-down after the first opening.
    pub cooldown: Duration,
    /// Upper bound for the doubled cool-down after failed probes.
    pub max_cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(10 * 60),
        }
    }
}

impl CircuitBreakerConfig {
    /// `cooldown * 2^reopen_count`, capped at `max_cooldown`.
    pub fn cooldown_for(&self, reopen_count: u32) -> Duration {
        let factor = 1_u32.checked_shl(reopen_count).unwrap_or(u32::MAX);
        self.cooldown
            .saturating_mul(factor)
            .min(self.max_cooldown.max(self.cooldown))
    }
}

/// Outcome of asking the breaker whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Closed circuit; call normally.
    Pass,
    /// This caller holds the single half-open trial slot.
    Probe,
    /// Open circuit, cool-down still running.
    Reject { retry_at_ms: i64 },
    /// Half-open and another caller's trial is in flight.
    ProbeInFlight,
}

impl Admission {
    pub const fn admits(self) -> bool {
        matches!(self, Self::Pass | Self::Probe)
    }
}

/// State change worth logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened { cooldown: Duration },
    Reopened { cooldown: Duration, reopen_count: u32 },
    HalfOpened,
    Closed,
}

/// Single-provider breaker. Not synchronized; the health tracker owns the lock.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at_ms: Option<i64>,
    reopen_count: u32,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at_ms: None,
            reopen_count: 0,
            probe_in_flight: false,
        }
    }

    /// Decide whether a call may proceed at `now_ms`.
    ///
    /// An open circuit whose cool-down has elapsed moves to half-open and the
    /// caller receives the trial slot. Nothing changes while the cool-down is
    /// still running.
    pub fn admit(&mut self, now_ms: i64) -> (Admission, Option<Transition>) {
        match self.state {
            CircuitState::Closed => (Admission::Pass, None),
            CircuitState::HalfOpen if self.probe_in_flight => (Admission::ProbeInFlight, None),
            CircuitState::HalfOpen => {
                self.probe_in_flight = true;
                (Admission::Probe, None)
            }
            CircuitState::Open => {
                let retry_at_ms = self.retry_at_ms().unwrap_or(now_ms);
                if now_ms < retry_at_ms {
                    return (Admission::Reject { retry_at_ms }, None);
                }
                self.state = CircuitState::HalfOpen;
                self.probe_in_flight = true;
                (Admission::Probe, Some(Transition::HalfOpened))
            }
        }
    }

    /// Read-only variant of [`CircuitBreaker::admit`].
    pub fn would_admit(&self, now_ms: i64) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !self.probe_in_flight,
            CircuitState::Open => self.retry_at_ms().map_or(true, |retry_at| now_ms >= retry_at),
        }
    }

    pub fn record_success(&mut self) -> Option<Transition> {
        self.consecutive_failures = 0;
        self.probe_in_flight = false;
        if self.state == CircuitState::Closed {
            return None;
        }

        self.state = CircuitState::Closed;
        self.opened_at_ms = None;
        self.reopen_count = 0;
        Some(Transition::Closed)
    }

    pub fn record_failure(&mut self, now_ms: i64) -> Option<Transition> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.state {
            CircuitState::HalfOpen => {
                self.reopen_count = self.reopen_count.saturating_add(1);
                self.state = CircuitState::Open;
                self.opened_at_ms = Some(now_ms);
                self.probe_in_flight = false;
                Some(Transition::Reopened {
                    cooldown: self.current_cooldown(),
                    reopen_count: self.reopen_count,
                })
            }
            CircuitState::Closed
                if self.consecutive_failures >= self.config.failure_threshold =>
            {
                self.state = CircuitState::Open;
                self.opened_at_ms = Some(now_ms);
                Some(Transition::Opened {
                    cooldown: self.current_cooldown(),
                })
            }
            CircuitState::Closed | CircuitState::Open => None,
        }
    }

    /// Give the half-open trial slot back without judging the provider.
    pub fn release_probe(&mut self) {
        self.probe_in_flight = false;
    }

    pub const fn state(&self) -> CircuitState {
        self.state
    }

    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub const fn opened_at_ms(&self) -> Option<i64> {
        self.opened_at_ms
    }

    pub const fn reopen_count(&self) -> u32 {
        self.reopen_count
    }

    pub const fn probe_in_flight(&self) -> bool {
        self.probe_in_flight
    }

    pub fn current_cooldown(&self) -> Duration {
        self.config.cooldown_for(self.reopen_count)
    }

    fn retry_at_ms(&self) -> Option<i64> {
        self.opened_at_ms
            .map(|opened_at| opened_at.saturating_add(duration_ms(self.current_cooldown())))
    }
}
