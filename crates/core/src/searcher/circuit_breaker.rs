//! Per-source circuit breaker.
//!
//! A source that fails `threshold` times in a row is disabled for a backoff
//! window that doubles with every trip. Once the window has elapsed the next
//! search runs the source as a probe: success closes the breaker, failure
//! disables it again with the next backoff step.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that disable a source.
    pub threshold: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            base_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(3600),
        }
    }
}

/// Whether a source may be queried right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Closed,
    /// Backoff elapsed; the next query decides whether the source recovers.
    Probe,
    Open { retry_in: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Open { .. })
    }
}

/// Snapshot of one source's breaker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakerStatus {
    pub consecutive_failures: u32,
    pub trips: u32,
    pub success_count: u64,
    pub disabled: bool,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    trips: u32,
    success_count: u64,
    disabled_until: Option<Instant>,
}

/// Breaker state for every source, each behind its own lock.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    states: RwLock<HashMap<String, Arc<Mutex<BreakerState>>>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: CircuitBreakerConfig {
                threshold: config.threshold.max(1),
                ..config
            },
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn state(&self, source: &str) -> Arc<Mutex<BreakerState>> {
        if let Some(state) = self
            .states
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(source)
        {
            return state.clone();
        }
        self.states
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(source.to_string())
            .or_default()
            .clone()
    }

    fn backoff(&self, trips: u32) -> Duration {
        let exponent = trips.saturating_sub(1).min(31);
        self.config
            .base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.config.max_backoff)
    }

    pub fn admit(&self, source: &str) -> Admission {
        self.admit_at(source, Instant::now())
    }

    pub fn admit_at(&self, source: &str, now: Instant) -> Admission {
        let state = self.state(source);
        let state = state.lock().unwrap_or_else(|e| e.into_inner());
        match state.disabled_until {
            None => Admission::Closed,
            Some(until) if now >= until => Admission::Probe,
            Some(until) => Admission::Open {
                retry_in: until - now,
            },
        }
    }

    /// Record a successful query. Returns true if the source had been
    /// disabled and is now re-enabled.
    pub fn record_success(&self, source: &str) -> bool {
        let state = self.state(source);
        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
        let was_disabled = state.disabled_until.is_some();
        state.success_count += 1;
        state.consecutive_failures = 0;
        state.trips = 0;
        state.disabled_until = None;
        was_disabled
    }

    pub fn record_failure(&self, source: &str) -> Option<Duration> {
        self.record_failure_at(source, Instant::now())
    }

    /// Record a failed query. Returns the backoff if this failure disabled
    /// the source.
    pub fn record_failure_at(&self, source: &str, now: Instant) -> Option<Duration> {
        let state = self.state(source);
        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        let probing = state.disabled_until.is_some_and(|until| now >= until);
        let tripping = state.disabled_until.is_none()
            && state.consecutive_failures == self.config.threshold;

        if probing || tripping {
            state.trips = state.trips.saturating_add(1);
            let backoff = self.backoff(state.trips);
            state.disabled_until = Some(now + backoff);
            Some(backoff)
        } else {
            None
        }
    }

    pub fn status(&self, source: &str) -> BreakerStatus {
        let state = self.state(source);
        let state = state.lock().unwrap_or_else(|e| e.into_inner());
        BreakerStatus {
            consecutive_failures: state.consecutive_failures,
            trips: state.trips,
            success_count: state.success_count,
            disabled: state.disabled_until.is_some(),
        }
    }
}
