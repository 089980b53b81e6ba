//! Per-route circuit breaking.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: route assumed broken, requests fail fast
//! - Half-Open: requests are trials testing whether the route recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count reaches threshold
//! Open → Half-Open: first admission check after open_timeout
//! Half-Open → Closed: a trial succeeds
//! Half-Open → Open: a trial failure brings failure_count back to threshold
//! ```
//!
//! # Design Decisions
//! - Per-route breaker keyed by `METHOD:path` (not global)
//! - The Open → Half-Open check runs on the admission path; no timers
//! - Half-Open admits every concurrent request as a trial
//! - Outcomes arriving while Open still count: failures extend the open
//!   period, successes reset the count without closing

use arc_swap::ArcSwap;
use axum::http::Method;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::SharedClock;
use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::registry::{EvictionPolicy, KeyedStore};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The handler answered with a 5xx status.
    ServerError,
    /// The handler failed to produce a response of its own.
    Exception,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Outcome::Success)
    }
}

/// A state change caused by one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { retry_after: Duration },
}

/// A three-state breaker for one route.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    failure_threshold: u32,
    open_timeout: Duration,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            failure_threshold: failure_threshold.max(1),
            open_timeout,
            last_failure: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    pub fn retune(&mut self, failure_threshold: u32, open_timeout: Duration) {
        self.failure_threshold = failure_threshold.max(1);
        self.open_timeout = open_timeout;
    }

    fn transition(&mut self, to: CircuitState) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }
        self.state = to;
        Some(Transition { from, to })
    }

    /// Decide whether a request may pass. Moves Open to Half-Open once the
    /// open timeout has elapsed since the last failure.
    pub fn try_admit(&mut self, now: Instant) -> (Admission, Option<Transition>) {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => (Admission::Admitted, None),
            CircuitState::Open => {
                let cooled = self
                    .last_failure
                    .map_or(true, |at| now.saturating_duration_since(at) >= self.open_timeout);
                if cooled {
                    (Admission::Admitted, self.transition(CircuitState::HalfOpen))
                } else {
                    (
                        Admission::Rejected {
                            retry_after: self.open_timeout,
                        },
                        None,
                    )
                }
            }
        }
    }

    pub fn on_success(&mut self) -> Option<Transition> {
        self.failure_count = 0;
        match self.state {
            CircuitState::HalfOpen => {
                self.last_failure = None;
                self.transition(CircuitState::Closed)
            }
            CircuitState::Closed => {
                self.last_failure = None;
                None
            }
            // Only a trial may close an open breaker.
            CircuitState::Open => None,
        }
    }

    pub fn on_failure(&mut self, now: Instant) -> Option<Transition> {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(now);
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen
                if self.failure_count >= self.failure_threshold =>
            {
                self.transition(CircuitState::Open)
            }
            _ => None,
        }
    }

    pub fn record(&mut self, outcome: Outcome, now: Instant) -> Option<Transition> {
        if outcome.is_failure() {
            self.on_failure(now)
        } else {
            self.on_success()
        }
    }
}

/// Inspection view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub route: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Seconds since the last recorded failure.
    pub last_failure_secs_ago: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
struct BreakerSettings {
    enabled: bool,
    failure_threshold: u32,
    open_timeout: Duration,
    eviction: EvictionPolicy,
}

impl BreakerSettings {
    fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self {
            enabled: config.enabled,
            failure_threshold: config.failure_threshold.max(1),
            open_timeout: config.open_timeout(),
            eviction: config.eviction(),
        }
    }
}

/// Circuit breakers keyed by route.
pub struct CircuitBreakers {
    breakers: KeyedStore<CircuitBreaker>,
    settings: ArcSwap<BreakerSettings>,
    clock: SharedClock,
}

impl CircuitBreakers {
    pub fn new(config: &CircuitBreakerConfig, clock: SharedClock) -> Self {
        Self {
            breakers: KeyedStore::new(clock.clone()),
            settings: ArcSwap::from_pointee(BreakerSettings::from_config(config)),
            clock,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.load().enabled
    }

    pub fn open_timeout(&self) -> Duration {
        self.settings.load().open_timeout
    }

    fn factory(settings: &BreakerSettings) -> impl FnOnce() -> CircuitBreaker + '_ {
        move || CircuitBreaker::new(settings.failure_threshold, settings.open_timeout)
    }

    pub fn check_admission(&self, route: &str) -> Admission {
        let settings = self.settings.load();
        let slot = self
            .breakers
            .get_or_create(route, Self::factory(&settings));

        let (admission, transition) = {
            let mut breaker = slot.lock();
            breaker.retune(settings.failure_threshold, settings.open_timeout);
            breaker.try_admit(self.clock.now())
        };

        if let Some(transition) = transition {
            log_transition(route, transition);
        }
        if let Admission::Rejected { .. } = admission {
            tracing::debug!(route = %route, "Circuit open, rejecting request");
            metrics::record_circuit_rejected();
        }
        // Admissions whose request never completes still count toward the ceiling.
        self.maybe_evict(&settings.eviction);
        admission
    }

    /// Record the outcome of an admitted request. Returns the state after
    /// the update.
    pub fn record_outcome(&self, route: &str, outcome: Outcome) -> CircuitState {
        let settings = self.settings.load();
        let slot = self
            .breakers
            .get_or_create(route, Self::factory(&settings));

        let (state, transition) = {
            let mut breaker = slot.lock();
            let transition = breaker.record(outcome, self.clock.now());
            (breaker.state(), transition)
        };

        if let Some(transition) = transition {
            log_transition(route, transition);
        }
        self.maybe_evict(&settings.eviction);
        state
    }

    fn maybe_evict(&self, policy: &EvictionPolicy) {
        if let Some(removed) = self.breakers.maybe_evict(policy) {
            let remaining = self.breakers.len();
            tracing::debug!(removed, remaining, "Evicted idle circuit breakers");
            metrics::record_evictions("circuit_breaker", removed, remaining);
        }
        metrics::record_registry_size("circuit_breaker", self.breakers.len());
    }

    /// Current state for `route`, if it is tracked.
    pub fn state(&self, route: &str) -> Option<CircuitState> {
        self.breakers.get(route).map(|slot| slot.lock().state())
    }

    /// All tracked breakers, sorted by route.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let now = self.clock.now();
        let mut snapshot: Vec<_> = self
            .breakers
            .entries()
            .into_iter()
            .map(|(route, slot)| {
                let breaker = slot.lock();
                BreakerSnapshot {
                    route,
                    state: breaker.state(),
                    failure_count: breaker.failure_count(),
                    last_failure_secs_ago: breaker
                        .last_failure()
                        .map(|at| now.saturating_duration_since(at).as_secs()),
                }
            })
            .collect();
        snapshot.sort_by(|a, b| a.route.cmp(&b.route));
        snapshot
    }

    /// Unconditional eviction pass. Returns the number of breakers removed.
    pub fn evict_stale(&self) -> usize {
        let ttl = self.settings.load().eviction.ttl;
        let removed = self.breakers.evict_stale(ttl);
        metrics::record_evictions("circuit_breaker", removed, self.breakers.len());
        removed
    }

    pub fn reconfigure(&self, config: &CircuitBreakerConfig) {
        let next = BreakerSettings::from_config(config);
        if **self.settings.load() != next {
            tracing::info!(
                enabled = next.enabled,
                failure_threshold = next.failure_threshold,
                open_timeout_secs = next.open_timeout.as_secs(),
                "Circuit breakers reconfigured"
            );
            self.settings.store(Arc::new(next));
        }
    }

    pub fn tracked_routes(&self) -> usize {
        self.breakers.len()
    }
}

fn log_transition(route: &str, transition: Transition) {
    if transition.to == CircuitState::Open {
        tracing::warn!(
            route = %route,
            from = %transition.from,
            to = %transition.to,
            "Circuit breaker opened"
        );
    } else {
        tracing::info!(
            route = %route,
            from = %transition.from,
            to = %transition.to,
            "Circuit breaker state changed"
        );
    }
    metrics::record_circuit_transition(transition.to.as_str());
}

/// Breaker key for a request: `METHOD:path`.
pub fn route_key(method: &Method, path: &str) -> String {
    format!("{method}:{path}")
}
