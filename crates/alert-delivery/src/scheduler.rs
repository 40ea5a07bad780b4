//! Notification scheduling.
//!
//! When an alert is raised, one pending delivery record is created per
//! matching enabled channel. Which channels match a given alert is the
//! rule evaluator's business; this side only persists the resulting set.
//! Scheduling failure is swallowed: alert creation must never fail because
//! notifications could not be queued.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DeliveryError;
use crate::models::{Alert, DeliveryRecord, NotificationChannel};
use crate::store::RecordStore;

/// External channel/alert matching rule, consumed as an opaque call.
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    /// Channels whose rules match this alert's severity and type.
    async fn matching_channels(
        &self,
        alert: &Alert,
    ) -> Result<Vec<NotificationChannel>, DeliveryError>;
}

/// Creates delivery records for newly raised alerts.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn RecordStore>,
    evaluator: Arc<dyn RuleEvaluator>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        evaluator: Arc<dyn RuleEvaluator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            evaluator,
            clock,
        }
    }

    /// Create pending delivery records for every enabled matching channel.
    ///
    /// Returns the number of records created; 0 on any early failure.
    /// Never returns an error.
    pub async fn schedule_alert_notifications(&self, alert_id: Uuid) -> usize {
        let alert = match self.store.get_alert(alert_id).await {
            Ok(Some(alert)) => alert,
            Ok(None) => {
                tracing::warn!(
                    target: "alert_delivery",
                    alert_id = %alert_id,
                    "Cannot schedule notifications for unknown alert"
                );
                return 0;
            }
            Err(e) => {
                tracing::error!(
                    target: "alert_delivery",
                    alert_id = %alert_id,
                    error = %e,
                    "Failed to load alert for scheduling"
                );
                return 0;
            }
        };

        let channels = match self.evaluator.matching_channels(&alert).await {
            Ok(channels) => channels,
            Err(e) => {
                tracing::error!(
                    target: "alert_delivery",
                    alert_id = %alert_id,
                    error = %e,
                    "Rule evaluation failed; no notifications scheduled"
                );
                return 0;
            }
        };

        let now = self.clock.now();
        let mut created = 0;
        for channel in channels.into_iter().filter(|c| c.enabled) {
            let record = DeliveryRecord::pending(alert_id, &channel, now);
            match self.store.create_delivery(record).await {
                Ok(()) => created += 1,
                Err(e) => {
                    // Best effort: keep creating records for the other
                    // channels.
                    tracing::error!(
                        target: "alert_delivery",
                        alert_id = %alert_id,
                        channel_id = %channel.id,
                        error = %e,
                        "Failed to create delivery record"
                    );
                }
            }
        }

        tracing::info!(
            target: "alert_delivery",
            alert_id = %alert_id,
            records_created = created,
            "Scheduled alert notifications"
        );
        created
    }
}
