//! The per-dependency circuit breaker state machine (spec §4.1).

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flowforge_core::{DependencyId, FlowforgeError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

/// Persisted + in-memory state for one dependency (spec §3 `CircuitState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitState {
    pub phase: CircuitPhase,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    /// Whether the single admitted half-open probe is currently in flight.
    #[serde(skip)]
    probe_in_flight: bool,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            phase: CircuitPhase::Closed,
            failure_count: 0,
            last_failure_at: None,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// On-disk shape for circuit persistence (spec §6.3): only
/// `(failure_count, opened_at)` per dependency survive a restart; `phase` and
/// `last_failure_at` are reconstructed from those on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCircuit {
    pub failure_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

pub struct CircuitBreaker {
    dep: DependencyId,
    failure_threshold: u32,
    open_duration: Duration,
    state: Mutex<CircuitState>,
    clock: std::sync::Arc<dyn flowforge_core::Clock>,
}

/// Whether a failed attempt should count against the circuit (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network, timeout, or dependency 5xx.
    Transport,
    /// Caller input rejected (4xx/business error) — never affects the circuit.
    Validation,
}

impl CircuitBreaker {
    pub fn new(
        dep: DependencyId,
        failure_threshold: u32,
        open_duration: Duration,
        clock: std::sync::Arc<dyn flowforge_core::Clock>,
    ) -> Self {
        Self {
            dep,
            failure_threshold,
            open_duration,
            state: Mutex::new(CircuitState::default()),
            clock,
        }
    }

    pub fn restore(&self, persisted: PersistedCircuit) {
        let mut state = self.state.lock();
        state.failure_count = persisted.failure_count;
        state.opened_at = persisted.opened_at;
        state.phase = match persisted.opened_at {
            Some(opened_at) if self.clock.now() < opened_at + self.open_duration => {
                CircuitPhase::Open
            }
            Some(_) => CircuitPhase::HalfOpen,
            None => CircuitPhase::Closed,
        };
    }

    pub fn persisted(&self) -> PersistedCircuit {
        let state = self.state.lock();
        PersistedCircuit {
            failure_count: state.failure_count,
            opened_at: state.opened_at,
        }
    }

    pub fn snapshot(&self) -> CircuitState {
        self.state.lock().clone()
    }

    pub fn dependency(&self) -> DependencyId {
        self.dep
    }

    /// User reset command (spec §4.1: "any → user reset command → Closed").
    pub fn reset(&self) {
        let mut state = self.state.lock();
        tracing::info!(dep = %self.dep, "circuit reset by operator command");
        *state = CircuitState::default();
    }

    /// Runs `attempt`, gating it behind the circuit. `classify` maps an
    /// `Err` from `attempt` to a `FailureClass`; it is never called on `Ok`.
    #[tracing::instrument(skip(self, attempt, classify), fields(dep = %self.dep))]
    pub async fn call<T, F, Fut>(
        &self,
        attempt: F,
        classify: impl Fn(&FlowforgeError) -> FailureClass,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.admit() {
            let retry_after = self.retry_after();
            tracing::warn!(dep = %self.dep, retry_after_s = retry_after.as_secs(), "circuit open, rejecting call");
            return Err(FlowforgeError::circuit_open(self.dep, retry_after));
        }

        match attempt().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                match classify(&err) {
                    FailureClass::Transport => self.on_transport_failure(),
                    FailureClass::Validation => self.on_validation_failure(),
                }
                Err(err)
            }
        }
    }

    /// Returns whether this call may proceed, performing the lazy
    /// Open→HalfOpen transition and admitting exactly one probe.
    fn admit(&self) -> bool {
        let mut state = self.state.lock();
        match state.phase {
            CircuitPhase::Closed => true,
            CircuitPhase::Open => {
                let opened_at = state.opened_at.unwrap_or_else(|| self.clock.now());
                if self.clock.now() >= opened_at + self.open_duration {
                    state.phase = CircuitPhase::HalfOpen;
                    state.probe_in_flight = true;
                    tracing::info!(dep = %self.dep, "circuit half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
            CircuitPhase::HalfOpen => {
                if state.probe_in_flight {
                    false
                } else {
                    state.probe_in_flight = true;
                    true
                }
            }
        }
    }

    fn retry_after(&self) -> Duration {
        let state = self.state.lock();
        match state.opened_at {
            Some(opened_at) => {
                let deadline = opened_at + self.open_duration;
                let now = self.clock.now();
                if deadline > now {
                    (deadline - now).to_std().unwrap_or(Duration::ZERO)
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock();
        let was = state.phase;
        state.phase = CircuitPhase::Closed;
        state.failure_count = 0;
        state.opened_at = None;
        state.probe_in_flight = false;
        if was != CircuitPhase::Closed {
            tracing::info!(dep = %self.dep, from = ?was, "circuit closed after success");
        }
    }

    fn on_validation_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count = 0;
        state.probe_in_flight = false;
    }

    fn on_transport_failure(&self) {
        let mut state = self.state.lock();
        let now = self.clock.now();
        state.last_failure_at = Some(now);
        state.probe_in_flight = false;

        match state.phase {
            CircuitPhase::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.failure_threshold {
                    state.phase = CircuitPhase::Open;
                    state.opened_at = Some(now);
                    state.failure_count = 0;
                    tracing::warn!(dep = %self.dep, "circuit opened after consecutive transport failures");
                }
            }
            CircuitPhase::HalfOpen => {
                state.phase = CircuitPhase::Open;
                state.opened_at = Some(now);
                tracing::warn!(dep = %self.dep, "half-open probe failed, circuit re-opened");
            }
            CircuitPhase::Open => {
                // Shouldn't happen: admit() would have rejected the call.
            }
        }
    }
}
