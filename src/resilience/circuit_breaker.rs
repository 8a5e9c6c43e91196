//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, failures are tracked
//! - Open: backend assumed down, never selected
//! - Half-Open: exactly one trial request may pass
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold within window
//! Open → Half-Open: after cool-down, or a passing health probe
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails (cool-down grows on repeated trips)
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global), guarded by the backend's own mutex
//! - All methods take `now` so transitions are deterministic
//! - Every transition is returned to the caller for logging and stats
//! - In half-open only the holder of the current trial permit can settle the
//!   circuit; outcomes of requests admitted earlier are ignored

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use crate::config::CircuitBreakerConfig;

/// Externally visible circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change, reported back to whoever caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitTransition {
    pub from: CircuitState,
    pub to: CircuitState,
}

impl CircuitTransition {
    /// True when this transition opened the circuit.
    pub fn is_trip(&self) -> bool {
        self.to == CircuitState::Open
    }
}

/// Permission to send one request, handed out by [`CircuitBreaker::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Admitted while the circuit was closed.
    Normal,
    /// The half-open trial, tagged with the trial it was issued for.
    Trial(u64),
}

impl Permit {
    pub fn is_trial(&self) -> bool {
        matches!(self, Permit::Trial(_))
    }
}

/// Per-backend failure-rate state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: usize,
    window: Duration,
    base_open: Duration,
    max_open: Duration,
    multiplier: f64,

    state: CircuitState,
    /// Failure timestamps inside the rolling window (closed state only).
    failures: VecDeque<Instant>,
    last_transition: Instant,
    /// Cool-down of the current open period.
    open_for: Duration,
    /// Consecutive trips since the circuit last closed.
    trips: u32,
    trial_in_flight: bool,
    /// Incremented for every trial permit issued.
    trial_seq: u64,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig, now: Instant) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1) as usize,
            window: config.window(),
            base_open: config.open_duration(),
            max_open: config.max_open_duration(),
            multiplier: config.backoff_multiplier.max(1.0),
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            last_transition: now,
            open_for: config.open_duration(),
            trips: 0,
            trial_in_flight: false,
            trial_seq: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Failures currently counted against the threshold.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn last_transition(&self) -> Instant {
        self.last_transition
    }

    /// Cool-down of the current (or most recent) open period.
    pub fn cool_down(&self) -> Duration {
        self.open_for
    }

    /// Move Open → Half-Open once the cool-down has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<CircuitTransition> {
        if self.state == CircuitState::Open && now.saturating_duration_since(self.last_transition) >= self.open_for {
            self.trial_in_flight = false;
            return Some(self.transition(CircuitState::HalfOpen, now));
        }
        None
    }

    /// Whether the backend may be offered to the selection algorithm.
    pub fn is_eligible(&self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !self.trial_in_flight,
            CircuitState::Open => false,
        }
    }

    /// Claim permission for one request, or `None` when it must not be sent.
    pub fn try_acquire(&mut self) -> Option<Permit> {
        match self.state {
            CircuitState::Closed => Some(Permit::Normal),
            CircuitState::HalfOpen if !self.trial_in_flight => {
                self.trial_in_flight = true;
                self.trial_seq += 1;
                Some(Permit::Trial(self.trial_seq))
            }
            _ => None,
        }
    }

    /// Whether `permit` is the trial currently holding the half-open slot.
    fn holds_trial(&self, permit: Permit) -> bool {
        self.state == CircuitState::HalfOpen
            && self.trial_in_flight
            && permit == Permit::Trial(self.trial_seq)
    }

    /// Give back a trial slot whose request never reported an outcome.
    pub fn release_trial(&mut self, permit: Permit) {
        if self.holds_trial(permit) {
            self.trial_in_flight = false;
        }
    }

    pub fn on_success(&mut self, permit: Permit, now: Instant) -> Option<CircuitTransition> {
        match self.state {
            CircuitState::Closed => {
                self.failures.clear();
                None
            }
            // Admitted before the trip, or a trial that was superseded.
            CircuitState::HalfOpen if !self.holds_trial(permit) => None,
            CircuitState::HalfOpen => {
                self.trial_in_flight = false;
                self.trips = 0;
                self.failures.clear();
                self.open_for = self.base_open;
                Some(self.transition(CircuitState::Closed, now))
            }
            // Late result from a request that started before the trip.
            CircuitState::Open => None,
        }
    }

    pub fn on_failure(&mut self, permit: Permit, now: Instant) -> Option<CircuitTransition> {
        match self.state {
            CircuitState::Closed => {
                self.failures.push_back(now);
                while let Some(&oldest) = self.failures.front() {
                    if now.saturating_duration_since(oldest) > self.window {
                        self.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if self.failures.len() >= self.failure_threshold {
                    Some(self.trip(now))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen if !self.holds_trial(permit) => None,
            CircuitState::HalfOpen => {
                self.trial_in_flight = false;
                Some(self.trip(now))
            }
            CircuitState::Open => None,
        }
    }

    /// Open the circuit on the health checker's request.
    pub fn force_open(&mut self, now: Instant) -> Option<CircuitTransition> {
        if self.state == CircuitState::Open {
            return None;
        }
        self.trial_in_flight = false;
        Some(self.trip(now))
    }

    /// A health probe passed.
    ///
    /// `restored` is set when the probe brought an unhealthy backend back, in
    /// which case the cool-down is skipped.
    pub fn on_probe_success(&mut self, now: Instant, restored: bool) -> Option<CircuitTransition> {
        if self.state != CircuitState::Open {
            return None;
        }
        if restored {
            self.trial_in_flight = false;
            return Some(self.transition(CircuitState::HalfOpen, now));
        }
        self.poll(now)
    }

    fn trip(&mut self, now: Instant) -> CircuitTransition {
        self.trips = self.trips.saturating_add(1);
        let factor = self.multiplier.powi(self.trips.saturating_sub(1).min(64) as i32);
        let scaled = self.base_open.as_secs_f64() * factor;
        self.open_for = if scaled.is_finite() && scaled < self.max_open.as_secs_f64() {
            Duration::from_secs_f64(scaled)
        } else {
            self.max_open
        };
        self.failures.clear();
        self.transition(CircuitState::Open, now)
    }

    fn transition(&mut self, to: CircuitState, now: Instant) -> CircuitTransition {
        let from = self.state;
        self.state = to;
        self.last_transition = now;
        CircuitTransition { from, to }
    }
}
