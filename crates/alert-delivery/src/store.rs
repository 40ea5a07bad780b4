//! Record store abstraction.
//!
//! The surrounding system owns persistence for alerts, channels, and
//! delivery records; this engine consumes it through `RecordStore`. The
//! trait is deliberately narrow: the select-with-filter/order/limit and
//! update-by-id surface the dispatcher, scheduler, and stats aggregator
//! need, nothing more.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Alert, DeliveryRecord, DeliveryStatus, NotificationChannel};

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Field updates applied to a delivery record after a dispatch attempt.
#[derive(Debug, Clone)]
pub struct DeliveryUpdate {
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// Replaces the stored error message; `None` clears it.
    pub error_message: Option<String>,
}

/// Storage operations consumed by the delivery engine.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Atomically select up to `limit` records in `pending` or `retrying`
    /// status, oldest `scheduled_at` first, and mark them `sending`.
    ///
    /// The returned records carry the status they had *before* being
    /// claimed, so a deferred record can be released back untouched.
    /// Atomicity of select-plus-mark is the store's responsibility; it is
    /// what makes overlapping dispatch cycles safe.
    async fn claim_due_deliveries(&self, limit: usize)
        -> Result<Vec<DeliveryRecord>, StoreError>;

    /// Restore a claimed record to the given status without touching any
    /// other field. Used to defer rate-limited records and to park
    /// deliveries abandoned at the cycle deadline.
    ///
    /// Must be a compare-and-set on `status = sending`: a record that has
    /// already reached an outcome (an abandoned task whose final update
    /// landed anyway) is left unchanged, so a terminal `sent` is never
    /// overwritten back into the queue.
    async fn release_delivery(&self, id: Uuid, status: DeliveryStatus) -> Result<(), StoreError>;

    /// Persist the outcome of a dispatch attempt.
    async fn update_delivery(&self, id: Uuid, update: DeliveryUpdate) -> Result<(), StoreError>;

    /// Insert a new delivery record (used by the scheduler).
    async fn create_delivery(&self, record: DeliveryRecord) -> Result<(), StoreError>;

    async fn get_channel(&self, id: Uuid) -> Result<Option<NotificationChannel>, StoreError>;

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError>;

    /// Number of records for this channel marked `sent` at or after
    /// `since`. Drives the rolling hourly rate limit.
    async fn sent_count_since(
        &self,
        channel_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// All delivery records created at or after `since`, for stats.
    async fn deliveries_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>, StoreError>;
}
