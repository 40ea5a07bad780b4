//! Per-channel circuit breaking.
//!
//! A persistently failing destination (a dead webhook, an unreachable
//! relay) must not soak up retry budget and worker slots that healthy
//! channels need. Each channel gets its own breaker: after
//! `failure_threshold` consecutive failures the circuit opens and calls
//! fail fast without touching the network; once `reset_timeout` elapses a
//! single half-open probe decides whether to close again.
//!
//! State is in-memory and process-local. A restart treats every channel as
//! healthy, which is acceptable: the first few calls re-discover a dead
//! endpoint at the cost of one failure burst.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DeliveryError;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, calls proceed.
    #[default]
    Closed,
    /// Circuit tripped, calls rejected immediately.
    Open,
    /// Testing recovery, one probe call allowed.
    HalfOpen,
}

impl CircuitState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Tuning knobs for circuit breaking.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before allowing a probe.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

/// Read-only view of a breaker, for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub channel_id: Uuid,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Breaker state machine for a single channel.
///
/// Pure with respect to time: the current instant is passed into every
/// transition so the registry can drive it from an injected clock.
#[derive(Debug)]
pub struct CircuitBreaker {
    channel_id: Uuid,
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<DateTime<Utc>>,
    probe_claimed_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(channel_id: Uuid, config: CircuitBreakerConfig) -> Self {
        Self {
            channel_id,
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            probe_claimed_at: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Whether a call may proceed right now.
    ///
    /// Transitions Open to HalfOpen once the reset timeout has elapsed
    /// since the last failure. A `true` return while half-open claims the
    /// single probe slot; the caller must report the outcome through
    /// `record_success` or `record_failure` before another probe is
    /// admitted.
    pub fn can_execute(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => match self.probe_claimed_at {
                None => {
                    self.probe_claimed_at = Some(now);
                    true
                }
                // A probe whose outcome never came back (the caller was
                // cancelled mid-call) must not wedge the channel; its
                // claim lapses after another reset window.
                Some(claimed_at)
                    if now.signed_duration_since(claimed_at).num_milliseconds()
                        >= self.config.reset_timeout.as_millis() as i64 =>
                {
                    self.probe_claimed_at = Some(now);
                    true
                }
                Some(_) => false,
            },
            CircuitState::Open => {
                let elapsed = self
                    .last_failure_at
                    .map(|at| now.signed_duration_since(at))
                    .unwrap_or_else(chrono::Duration::zero);

                if elapsed.num_milliseconds() >= self.config.reset_timeout.as_millis() as i64 {
                    self.state = CircuitState::HalfOpen;
                    self.probe_claimed_at = Some(now);
                    tracing::info!(
                        target: "circuit_breaker",
                        channel_id = %self.channel_id,
                        "Circuit transitioning to half-open for probe"
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call. Closes the circuit and resets the
    /// failure count.
    pub fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            tracing::info!(
                target: "circuit_breaker",
                channel_id = %self.channel_id,
                "Circuit closed after successful probe"
            );
        }
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.probe_claimed_at = None;
    }

    /// Record a failed call. Opens the circuit once the threshold is
    /// reached, or re-opens it after a failed half-open probe.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.last_failure_at = Some(now);
        self.failure_count += 1;
        self.probe_claimed_at = None;

        match self.state {
            CircuitState::Closed => {
                if self.failure_count >= self.config.failure_threshold {
                    self.state = CircuitState::Open;
                    tracing::warn!(
                        target: "circuit_breaker",
                        channel_id = %self.channel_id,
                        failure_count = self.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit opened after consecutive failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                tracing::warn!(
                    target: "circuit_breaker",
                    channel_id = %self.channel_id,
                    "Circuit reopened after failed probe"
                );
            }
            CircuitState::Open => {}
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            channel_id: self.channel_id,
            state: self.state,
            failure_count: self.failure_count,
            last_failure_at: self.last_failure_at,
        }
    }
}

/// Shared map of breakers keyed by channel id.
///
/// Owned by the dispatcher; safe to use from concurrent deliveries to the
/// same channel. The write lock is held only for state transitions, never
/// across the wrapped call.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<RwLock<HashMap<Uuid, CircuitBreaker>>>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            config,
            clock,
        }
    }

    /// Run `call` under the channel's breaker.
    ///
    /// Returns `DeliveryError::CircuitOpen` without polling the future
    /// when the circuit rejects the call; otherwise records the outcome.
    pub async fn execute<T, Fut>(&self, channel_id: Uuid, call: Fut) -> Result<T, DeliveryError>
    where
        Fut: Future<Output = Result<T, DeliveryError>>,
    {
        {
            let mut breakers = self.breakers.write().await;
            let breaker = breakers
                .entry(channel_id)
                .or_insert_with(|| CircuitBreaker::new(channel_id, self.config.clone()));
            if !breaker.can_execute(self.clock.now()) {
                return Err(DeliveryError::CircuitOpen(channel_id));
            }
        }

        let result = call.await;

        let mut breakers = self.breakers.write().await;
        if let Some(breaker) = breakers.get_mut(&channel_id) {
            match &result {
                Ok(_) => breaker.record_success(),
                Err(_) => breaker.record_failure(self.clock.now()),
            }
        }

        result
    }

    /// Snapshot of one channel's breaker, if it has been used.
    pub async fn snapshot(&self, channel_id: Uuid) -> Option<CircuitSnapshot> {
        let breakers = self.breakers.read().await;
        breakers.get(&channel_id).map(CircuitBreaker::snapshot)
    }

    /// Snapshots of every breaker the registry has seen.
    pub async fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let breakers = self.breakers.read().await;
        breakers.values().map(CircuitBreaker::snapshot).collect()
    }
}
