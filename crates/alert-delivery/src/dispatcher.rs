//! Delivery dispatcher.
//!
//! Claims due delivery records and pushes each one through the
//! retry-engine → circuit-breaker → channel-adapter composition, then
//! persists the outcome. One invocation processes one batch; overlapping
//! invocations are safe because claiming is atomic at the store.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

use crate::backoff::BackoffPolicy;
use crate::channels::{AdapterSet, NotificationMessage};
use crate::circuit_breaker::{CircuitBreakerRegistry, CircuitSnapshot};
use crate::clock::Clock;
use crate::error::{DeliveryError, ErrorClass};
use crate::models::{DeliveryRecord, DeliveryStatus, NotificationChannel};
use crate::retry::{self, RetryPolicy};
use crate::store::{DeliveryUpdate, RecordStore};

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum records claimed per cycle.
    pub batch_size: usize,
    /// Concurrent deliveries in flight; bounds pressure on downstream
    /// endpoints.
    pub concurrency: usize,
    /// Overall deadline for one cycle. Deliveries still retrying when it
    /// elapses are written back to `retrying` and re-picked next cycle.
    pub cycle_deadline: Duration,
    /// Cap applied to per-channel backoff delays.
    pub max_backoff: Duration,
    /// Fixed seed for backoff jitter; `None` seeds from entropy.
    pub rng_seed: Option<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 8,
            cycle_deadline: Duration::from_secs(30),
            max_backoff: Duration::from_secs(60),
            rng_seed: None,
        }
    }
}

/// Processes pending and retrying delivery records.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn RecordStore>,
    adapters: Arc<AdapterSet>,
    breakers: CircuitBreakerRegistry,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        adapters: Arc<AdapterSet>,
        breakers: CircuitBreakerRegistry,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            adapters,
            breakers,
            clock,
            config,
        }
    }

    /// Process one batch of due deliveries. Returns the number of records
    /// claimed.
    ///
    /// Idempotent and safe under concurrent invocation: records already
    /// `sending` or terminal are never claimed. Storage failures are
    /// logged and the cycle returns normally.
    pub async fn process_pending_deliveries(&self) -> usize {
        let records = match self.store.claim_due_deliveries(self.config.batch_size).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(
                    target: "alert_delivery",
                    error = %e,
                    "Failed to claim due deliveries; skipping cycle"
                );
                return 0;
            }
        };

        if records.is_empty() {
            return 0;
        }

        tracing::info!(
            target: "alert_delivery",
            batch = records.len(),
            "Dispatching delivery batch"
        );

        let claimed = records.len();
        let deadline = Instant::now() + self.config.cycle_deadline;
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for record in records {
            let dispatcher = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let result = timeout_at(deadline, async {
                    // Holding the permit inside the deadline keeps a
                    // stalled pool from pinning abandoned records in
                    // `sending`.
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    dispatcher.process_one(&record).await;
                })
                .await;

                if result.is_err() {
                    dispatcher.abandon(&record).await;
                }
            });
        }

        while tasks.join_next().await.is_some() {}
        claimed
    }

    /// Read-only circuit breaker state for every channel seen so far.
    pub async fn circuit_snapshots(&self) -> Vec<CircuitSnapshot> {
        self.breakers.snapshots().await
    }

    /// Deliver a single claimed record and persist the outcome.
    async fn process_one(&self, record: &DeliveryRecord) {
        let channel = match self.store.get_channel(record.channel_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                self.finish(
                    record,
                    DeliveryStatus::Failed,
                    record.attempt_count,
                    Some(format!("channel {} not found", record.channel_id)),
                )
                .await;
                return;
            }
            Err(e) => {
                tracing::error!(
                    target: "alert_delivery",
                    delivery_id = %record.id,
                    channel_id = %record.channel_id,
                    error = %e,
                    "Failed to load channel; leaving record for next cycle"
                );
                self.abandon(record).await;
                return;
            }
        };

        if !channel.enabled {
            self.finish(
                record,
                DeliveryStatus::Failed,
                record.attempt_count,
                Some(DeliveryError::ChannelDisabled(channel.id).to_string()),
            )
            .await;
            return;
        }

        // Rolling hourly rate limit. A limited record is deferred with its
        // pre-claim status untouched, not failed.
        if channel.rate_limit_per_hour > 0 {
            let since = self.clock.now() - chrono::Duration::hours(1);
            match self.store.sent_count_since(channel.id, since).await {
                Ok(sent) if sent >= u64::from(channel.rate_limit_per_hour) => {
                    tracing::debug!(
                        target: "alert_delivery",
                        delivery_id = %record.id,
                        channel_id = %channel.id,
                        sent_last_hour = sent,
                        limit = channel.rate_limit_per_hour,
                        "Channel rate limited; deferring delivery"
                    );
                    self.release(record).await;
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        target: "alert_delivery",
                        delivery_id = %record.id,
                        error = %e,
                        "Failed to read rate limit counter; leaving record for next cycle"
                    );
                    self.abandon(record).await;
                    return;
                }
            }
        }

        let alert = match self.store.get_alert(record.alert_id).await {
            Ok(Some(alert)) => alert,
            Ok(None) => {
                self.finish(
                    record,
                    DeliveryStatus::Failed,
                    record.attempt_count,
                    Some(DeliveryError::AlertNotFound(record.alert_id).to_string()),
                )
                .await;
                return;
            }
            Err(e) => {
                tracing::error!(
                    target: "alert_delivery",
                    delivery_id = %record.id,
                    error = %e,
                    "Failed to load alert; leaving record for next cycle"
                );
                self.abandon(record).await;
                return;
            }
        };

        // Budget already spent in earlier cycles counts against the
        // channel's cap; a claimed record with nothing left is terminal.
        let remaining = channel.retry_attempts.saturating_sub(record.attempt_count);
        if remaining == 0 {
            self.finish(
                record,
                DeliveryStatus::Failed,
                record.attempt_count,
                Some("retry budget exhausted".to_string()),
            )
            .await;
            return;
        }

        let message = NotificationMessage::from_alert(&alert);
        let policy = RetryPolicy {
            max_attempts: remaining,
            backoff: BackoffPolicy {
                base: Duration::from_secs(channel.retry_delay_seconds),
                max: self.config.max_backoff,
                ..BackoffPolicy::default()
            },
        };

        let mut rng = match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let adapters = Arc::clone(&self.adapters);
        let breakers = self.breakers.clone();
        let outcome = retry::run(&policy, &mut rng, || {
            let adapters = Arc::clone(&adapters);
            let breakers = breakers.clone();
            let channel = channel.clone();
            let message = message.clone();
            async move {
                breakers
                    .execute(channel.id, async {
                        adapters.get(channel.kind).send(&channel, &message).await
                    })
                    .await
            }
        })
        .await;

        self.record_outcome(record, &channel, outcome).await;
    }

    async fn record_outcome(
        &self,
        record: &DeliveryRecord,
        channel: &NotificationChannel,
        outcome: retry::RetryOutcome<()>,
    ) {
        match outcome.result {
            Ok(()) => {
                let attempts = record.attempt_count + outcome.attempts;
                tracing::info!(
                    target: "alert_delivery",
                    delivery_id = %record.id,
                    alert_id = %record.alert_id,
                    channel_id = %channel.id,
                    method = channel.kind.as_str(),
                    attempt_count = attempts,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Delivery succeeded"
                );
                self.finish(record, DeliveryStatus::Sent, attempts, None).await;
            }
            Err(err) => {
                let (status, attempts) = match err.class() {
                    ErrorClass::Fatal => {
                        (DeliveryStatus::Failed, record.attempt_count + outcome.attempts)
                    }
                    ErrorClass::Transient => {
                        let attempts = record.attempt_count + outcome.attempts;
                        if attempts >= channel.retry_attempts {
                            (DeliveryStatus::Failed, attempts)
                        } else {
                            (DeliveryStatus::Retrying, attempts)
                        }
                    }
                    // The final call never reached the adapter, so it does
                    // not consume budget. The record waits for the
                    // breaker's reset window via the next cycle.
                    ErrorClass::CircuitOpen => (
                        DeliveryStatus::Retrying,
                        record.attempt_count + outcome.attempts.saturating_sub(1),
                    ),
                };

                tracing::warn!(
                    target: "alert_delivery",
                    delivery_id = %record.id,
                    alert_id = %record.alert_id,
                    channel_id = %channel.id,
                    method = channel.kind.as_str(),
                    status = status.as_str(),
                    attempt_count = attempts,
                    error = %err,
                    "Delivery failed"
                );
                self.finish(record, status, attempts, Some(err.to_string())).await;
            }
        }
    }

    /// Persist a dispatch outcome; failures here are logged, never raised.
    async fn finish(
        &self,
        record: &DeliveryRecord,
        status: DeliveryStatus,
        attempt_count: u32,
        error_message: Option<String>,
    ) {
        let update = DeliveryUpdate {
            status,
            attempt_count,
            last_attempted_at: Some(self.clock.now()),
            error_message,
        };
        if let Err(e) = self.store.update_delivery(record.id, update).await {
            tracing::error!(
                target: "alert_delivery",
                delivery_id = %record.id,
                error = %e,
                "Failed to persist delivery outcome"
            );
        }
    }

    /// Put a claimed record back exactly as it was (rate-limit deferral).
    async fn release(&self, record: &DeliveryRecord) {
        if let Err(e) = self.store.release_delivery(record.id, record.status).await {
            tracing::error!(
                target: "alert_delivery",
                delivery_id = %record.id,
                error = %e,
                "Failed to release deferred delivery"
            );
        }
    }

    /// Park a record in `retrying` for the next cycle (deadline hit or a
    /// storage hiccup mid-flight). Attempt count is left as claimed; state
    /// lives in the record, so nothing is lost. `release_delivery` only
    /// touches records still `sending`, so an outcome that landed before
    /// the cancellation took effect wins over the park.
    async fn abandon(&self, record: &DeliveryRecord) {
        tracing::warn!(
            target: "alert_delivery",
            delivery_id = %record.id,
            "Abandoning delivery until next cycle"
        );
        if let Err(e) = self
            .store
            .release_delivery(record.id, DeliveryStatus::Retrying)
            .await
        {
            tracing::error!(
                target: "alert_delivery",
                delivery_id = %record.id,
                error = %e,
                "Failed to park abandoned delivery"
            );
        }
    }
}

/// Snapshot accessor used by the engine facade.
impl Dispatcher {
    pub async fn circuit_snapshot(&self, channel_id: Uuid) -> Option<CircuitSnapshot> {
        self.breakers.snapshot(channel_id).await
    }
}
