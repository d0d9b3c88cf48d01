//! Circuit breaker for the model endpoint.
//!
//! Closed → Open after `failure_threshold` consecutive failures. Open →
//! HalfOpen once the cooldown elapses; HalfOpen admits exactly one probe.
//! A successful probe closes the circuit, a failed probe re-opens it and
//! restarts the cooldown.
//!
//! Uses `tokio::time::Instant` so paused-clock tests can drive the cooldown.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use taskweave_core::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// A minimal three-state circuit breaker. Shared via `&self`; all state
/// sits behind one mutex, and no lock is held across an await.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Ask permission to make a call. `Err(CircuitOpen)` rejects the call
    /// without touching the endpoint.
    pub fn try_acquire(&self) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            State::Closed => Ok(()),
            State::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.cooldown {
                    info!("Circuit cooldown elapsed, admitting half-open probe");
                    inner.state = State::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(GatewayError::CircuitOpen)
                }
            }
            State::HalfOpen => {
                if inner.probe_in_flight {
                    // One probe at a time; concurrent callers are rejected.
                    Err(GatewayError::CircuitOpen)
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Report a successful call. Closes the circuit from any state.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        if inner.state != State::Closed {
            info!("Circuit closing after successful call");
        }
        inner.state = State::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Report a failed call. A half-open probe failure re-opens immediately;
    /// a closed-state failure counts toward the threshold.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            State::HalfOpen => {
                warn!("Half-open probe failed, circuit re-opening");
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            }
            State::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    warn!(
                        failures = inner.consecutive_failures,
                        "Failure threshold reached, circuit opening"
                    );
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            State::Open => {}
        }
    }

    /// Whether calls would currently be rejected.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            State::Closed => false,
            State::HalfOpen => inner.probe_in_flight,
            State::Open => inner
                .opened_at
                .map(|at| at.elapsed() < self.cooldown)
                .unwrap_or(true),
        }
    }
}
