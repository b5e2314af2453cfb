//! # Circuit Breaker Implementation
//!
//! Fault isolation for monitored sources following the classic three-state
//! pattern: Closed (normal operation), Open (failing fast), and Half-Open
//! (testing recovery with a bounded number of trial calls).
//!
//! ## Overview
//!
//! Unlike breaker designs that wrap the protected call, this one splits
//! admission from outcome recording: callers ask [`CircuitBreaker::admit`]
//! before dialing out, then report [`CircuitBreaker::record_success`] or
//! [`CircuitBreaker::record_failure`] afterwards. The split lets the run
//! orchestrator interleave rate limiting and timeouts between admission and
//! the call itself.
//!
//! All mutable state lives behind a single mutex, so observers never see a
//! state flag and its counters mid-transition. Decisions use the monotonic
//! clock; wall-clock timestamps ride along for reporting and snapshots.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::BreakerSettings;
use crate::constants::{defaults, events};
use crate::logging;

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls are allowed through
    Closed,
    /// Failure mode - calls fail fast without executing
    Open,
    /// Testing recovery - limited trial calls allowed
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
        write!(f, "{}", self.as_str())
    }
}

/// Circuit breaker tuning parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures before a closed breaker opens
    pub failure_threshold: u32,
    /// Consecutive trial successes before a half-open breaker closes
    pub success_threshold: u32,
    /// How long an open breaker waits before admitting trial calls
    pub open_duration: Duration,
    /// Concurrent trial calls admitted while half-open
    pub max_trial_calls: u32,
}

impl BreakerConfig {
    /// Convert from the YAML settings form
    pub fn from_settings(settings: &BreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            success_threshold: settings.success_threshold,
            open_duration: settings.open_duration(),
            max_trial_calls: settings.max_trial_calls,
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            success_threshold: defaults::BREAKER_SUCCESS_THRESHOLD,
            open_duration: Duration::from_secs(defaults::BREAKER_OPEN_DURATION_SECONDS),
            max_trial_calls: defaults::BREAKER_MAX_TRIAL_CALLS,
        }
    }
}

/// Admission decision returned by [`CircuitBreaker::admit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed; the caller must report the outcome or release
    Allowed,
    /// The call must not proceed
    Rejected { reason: String },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// One recorded state transition, retained in a bounded per-breaker journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerTransition {
    pub source: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
}

/// Serializable breaker state for restart persistence.
///
/// `open_until` anchors the open window to the wall clock so a restarted
/// process resumes the remaining wait instead of starting a fresh one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub source: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_transition_at: DateTime<Utc>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub open_until: Option<DateTime<Utc>>,
}

/// Point-in-time view of a breaker for dashboards and health scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub source: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub trials_in_flight: u32,
    /// Remaining open time; None unless the breaker is open
    pub open_remaining: Option<Duration>,
    pub last_transition_at: DateTime<Utc>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Mutable breaker state, private behind the core mutex
#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    trials_in_flight: u32,
    /// Monotonic deadline for the current open period
    open_deadline: Option<Instant>,
    /// Wall-clock mirror of the deadline, carried into snapshots
    open_until: Option<DateTime<Utc>>,
    last_transition_at: DateTime<Utc>,
    last_failure_at: Option<DateTime<Utc>>,
    journal: VecDeque<BreakerTransition>,
}

impl BreakerCore {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            trials_in_flight: 0,
            open_deadline: None,
            open_until: None,
            last_transition_at: Utc::now(),
            last_failure_at: None,
            journal: VecDeque::new(),
        }
    }
}

/// Per-source circuit breaker with linearizable transitions
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    core: Mutex<BreakerCore>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let name = name.into();
        debug!(
            source = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            open_duration_seconds = config.open_duration.as_secs(),
            max_trial_calls = config.max_trial_calls,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            config,
            core: Mutex::new(BreakerCore::new()),
        }
    }

    /// Get the breaker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the breaker configuration
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    /// Whether the breaker currently passes traffic unrestricted
    pub fn is_healthy(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Decide whether a call may proceed.
    ///
    /// An open breaker whose open period has elapsed transitions to
    /// half-open here, and the admission that triggered the transition
    /// consumes the first trial slot. Every `Allowed` must be settled with
    /// [`Self::record_success`], [`Self::record_failure`], or
    /// [`Self::release`].
    pub fn admit(&self) -> Admission {
        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let now = Instant::now();
                let elapsed = core.open_deadline.is_none_or(|deadline| now >= deadline);
                if elapsed {
                    self.transition(&mut core, CircuitState::HalfOpen);
                    core.trials_in_flight = 1;
                    Admission::Allowed
                } else {
                    let remaining = core
                        .open_deadline
                        .map(|deadline| deadline.saturating_duration_since(now))
                        .unwrap_or_default();
                    Admission::Rejected {
                        reason: format!("open for another {}s", remaining.as_secs()),
                    }
                }
            }
            CircuitState::HalfOpen => {
                if core.trials_in_flight < self.config.max_trial_calls {
                    core.trials_in_flight += 1;
                    Admission::Allowed
                } else {
                    Admission::Rejected {
                        reason: format!(
                            "half-open trial limit of {} reached",
                            self.config.max_trial_calls
                        ),
                    }
                }
            }
        }
    }

    /// Release an admission whose call was never made (e.g. the rate
    /// limiter denied it after admission). Frees a half-open trial slot
    /// without recording an outcome.
    pub fn release(&self) {
        let mut core = self.core.lock();
        if core.state == CircuitState::HalfOpen {
            core.trials_in_flight = core.trials_in_flight.saturating_sub(1);
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => {
                core.consecutive_failures = 0;
                core.consecutive_successes += 1;
            }
            CircuitState::HalfOpen => {
                core.trials_in_flight = core.trials_in_flight.saturating_sub(1);
                core.consecutive_successes += 1;
                if core.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut core, CircuitState::Closed);
                }
            }
            CircuitState::Open => {
                // A call admitted before the trip finished late; the open
                // timer is authoritative, so only note it
                debug!(source = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut core = self.core.lock();
        core.last_failure_at = Some(Utc::now());
        match core.state {
            CircuitState::Closed => {
                core.consecutive_successes = 0;
                core.consecutive_failures += 1;
                if core.consecutive_failures >= self.config.failure_threshold {
                    self.transition(&mut core, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                // Any trial failure reopens immediately with a fresh window
                core.trials_in_flight = core.trials_in_flight.saturating_sub(1);
                self.transition(&mut core, CircuitState::Open);
            }
            CircuitState::Open => {
                // Already open; a late completion changes nothing
            }
        }
    }

    /// Force the circuit open (operational override)
    pub fn force_open(&self, reason: &str) {
        let mut core = self.core.lock();
        if core.state != CircuitState::Open {
            tracing::warn!(source = %self.name, reason = %reason, "🚨 Circuit breaker forced open");
            self.transition(&mut core, CircuitState::Open);
        }
    }

    /// Force the circuit closed (operational override)
    pub fn force_close(&self, reason: &str) {
        let mut core = self.core.lock();
        if core.state != CircuitState::Closed {
            tracing::warn!(source = %self.name, reason = %reason, "🚨 Circuit breaker forced closed");
            self.transition(&mut core, CircuitState::Closed);
        }
    }

    /// Point-in-time status for dashboards and health scoring
    pub fn status(&self) -> BreakerStatus {
        let core = self.core.lock();
        let open_remaining = match core.state {
            CircuitState::Open => Some(
                core.open_deadline
                    .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                    .unwrap_or_default(),
            ),
            _ => None,
        };
        BreakerStatus {
            source: self.name.clone(),
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            consecutive_successes: core.consecutive_successes,
            trials_in_flight: core.trials_in_flight,
            open_remaining,
            last_transition_at: core.last_transition_at,
            last_failure_at: core.last_failure_at,
        }
    }

    /// Transitions recorded within the trailing window, oldest first
    pub fn transitions_within(&self, window: Duration) -> Vec<BreakerTransition> {
        let core = self.core.lock();
        let now = Utc::now();
        core.journal
            .iter()
            .filter(|t| {
                now.signed_duration_since(t.at)
                    .to_std()
                    .map(|age| age <= window)
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// Serializable state for restart persistence
    pub fn snapshot(&self) -> BreakerSnapshot {
        let core = self.core.lock();
        BreakerSnapshot {
            source: self.name.clone(),
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            consecutive_successes: core.consecutive_successes,
            last_transition_at: core.last_transition_at,
            last_failure_at: core.last_failure_at,
            open_until: core.open_until,
        }
    }

    /// Restore state from a snapshot taken before a restart.
    ///
    /// An open breaker resumes the remaining portion of its open window; a
    /// window that expired while the process was down leaves the breaker
    /// open with an elapsed deadline, so the next admission runs a trial.
    /// In-flight trial counts are process-local and reset to zero.
    pub fn restore(&self, snapshot: &BreakerSnapshot) {
        let mut core = self.core.lock();
        core.state = snapshot.state;
        core.consecutive_failures = snapshot.consecutive_failures;
        core.consecutive_successes = snapshot.consecutive_successes;
        core.trials_in_flight = 0;
        core.last_transition_at = snapshot.last_transition_at;
        core.last_failure_at = snapshot.last_failure_at;
        core.open_until = snapshot.open_until;
        core.open_deadline = match (snapshot.state, snapshot.open_until) {
            (CircuitState::Open, Some(until)) => {
                let remaining = until
                    .signed_duration_since(Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                Some(Instant::now() + remaining)
            }
            (CircuitState::Open, None) => Some(Instant::now()),
            _ => None,
        };

        debug!(
            source = %self.name,
            state = %snapshot.state,
            consecutive_failures = snapshot.consecutive_failures,
            "Circuit breaker state restored from snapshot"
        );
    }

    /// Apply a state change, journal it, and log it. Caller holds the lock.
    fn transition(&self, core: &mut BreakerCore, to: CircuitState) {
        let from = core.state;
        if from == to {
            return;
        }
        let now = Utc::now();

        core.state = to;
        core.last_transition_at = now;
        match to {
            CircuitState::Open => {
                core.open_deadline = Some(Instant::now() + self.config.open_duration);
                core.open_until = now
                    .checked_add_signed(
                        chrono::Duration::from_std(self.config.open_duration)
                            .unwrap_or(chrono::Duration::zero()),
                    )
                    .or(Some(now));
                core.consecutive_successes = 0;
            }
            CircuitState::HalfOpen => {
                core.open_deadline = None;
                core.open_until = None;
                core.consecutive_successes = 0;
                core.trials_in_flight = 0;
            }
            CircuitState::Closed => {
                core.open_deadline = None;
                core.open_until = None;
                core.consecutive_failures = 0;
                core.consecutive_successes = 0;
                core.trials_in_flight = 0;
            }
        }

        core.journal.push_back(BreakerTransition {
            source: self.name.clone(),
            from,
            to,
            at: now,
        });
        while core.journal.len() > defaults::BREAKER_JOURNAL_CAPACITY {
            core.journal.pop_front();
        }

        let (event, detail) = match to {
            CircuitState::Open => (
                events::BREAKER_OPENED,
                format!(
                    "🔴 failing fast for {}s after {} consecutive failures",
                    self.config.open_duration.as_secs(),
                    core.consecutive_failures
                ),
            ),
            CircuitState::HalfOpen => (
                events::BREAKER_HALF_OPEN,
                format!(
                    "🟡 testing recovery with up to {} trial calls",
                    self.config.max_trial_calls
                ),
            ),
            CircuitState::Closed => (events::BREAKER_CLOSED, "🟢 recovered".to_string()),
        };
        logging::log_breaker_transition(event, &self.name, from.as_str(), to.as_str(), Some(&detail));
    }
}
