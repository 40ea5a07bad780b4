//! Common test utilities for alert-delivery integration tests.
//!
//! Provides an in-memory record store, a canned rule evaluator, fixture
//! builders, and wiremock responders for exercising delivery behavior
//! without a real database or real endpoints.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use alert_delivery::{
    Alert, AlertStatus, AlertType, ChannelConfig, ChannelKind, DeliveryError, DeliveryRecord,
    DeliveryStatus, DeliveryUpdate, NotificationChannel, RecordStore, RuleEvaluator, StoreError,
};

// ---------------------------------------------------------------------------
// In-memory record store
// ---------------------------------------------------------------------------

/// In-memory `RecordStore` with the claim semantics of the real store:
/// claiming marks a record `sending` but returns it with its pre-claim
/// status.
#[derive(Default)]
pub struct MemoryStore {
    alerts: Mutex<HashMap<Uuid, Alert>>,
    channels: Mutex<HashMap<Uuid, NotificationChannel>>,
    deliveries: Mutex<HashMap<Uuid, DeliveryRecord>>,
    fail_creates: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_alert(&self, alert: Alert) {
        self.alerts.lock().unwrap().insert(alert.id, alert);
    }

    pub fn insert_channel(&self, channel: NotificationChannel) {
        self.channels.lock().unwrap().insert(channel.id, channel);
    }

    pub fn insert_delivery(&self, record: DeliveryRecord) {
        self.deliveries.lock().unwrap().insert(record.id, record);
    }

    pub fn delivery(&self, id: Uuid) -> DeliveryRecord {
        self.deliveries.lock().unwrap().get(&id).cloned().unwrap()
    }

    pub fn deliveries_for_alert(&self, alert_id: Uuid) -> Vec<DeliveryRecord> {
        self.deliveries
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.alert_id == alert_id)
            .cloned()
            .collect()
    }

    /// Make every `create_delivery` call fail from now on.
    pub fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn claim_due_deliveries(
        &self,
        limit: usize,
    ) -> Result<Vec<DeliveryRecord>, StoreError> {
        let mut deliveries = self.deliveries.lock().unwrap();
        let mut due: Vec<DeliveryRecord> = deliveries
            .values()
            .filter(|r| {
                matches!(r.status, DeliveryStatus::Pending | DeliveryStatus::Retrying)
            })
            .cloned()
            .collect();
        due.sort_by_key(|r| r.scheduled_at);
        due.truncate(limit);

        for record in &due {
            if let Some(stored) = deliveries.get_mut(&record.id) {
                stored.status = DeliveryStatus::Sending;
            }
        }
        Ok(due)
    }

    async fn release_delivery(
        &self,
        id: Uuid,
        status: DeliveryStatus,
    ) -> Result<(), StoreError> {
        let mut deliveries = self.deliveries.lock().unwrap();
        let record = deliveries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        // Compare-and-set: only a still-claimed record is released.
        if record.status == DeliveryStatus::Sending {
            record.status = status;
        }
        Ok(())
    }

    async fn update_delivery(&self, id: Uuid, update: DeliveryUpdate) -> Result<(), StoreError> {
        let mut deliveries = self.deliveries.lock().unwrap();
        let record = deliveries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.status = update.status;
        record.attempt_count = update.attempt_count;
        record.last_attempted_at = update.last_attempted_at;
        record.error_message = update.error_message;
        Ok(())
    }

    async fn create_delivery(&self, record: DeliveryRecord) -> Result<(), StoreError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store offline".to_string()));
        }
        self.deliveries.lock().unwrap().insert(record.id, record);
        Ok(())
    }

    async fn get_channel(&self, id: Uuid) -> Result<Option<NotificationChannel>, StoreError> {
        Ok(self.channels.lock().unwrap().get(&id).cloned())
    }

    async fn get_alert(&self, id: Uuid) -> Result<Option<Alert>, StoreError> {
        Ok(self.alerts.lock().unwrap().get(&id).cloned())
    }

    async fn sent_count_since(
        &self,
        channel_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let deliveries = self.deliveries.lock().unwrap();
        Ok(deliveries
            .values()
            .filter(|r| {
                r.channel_id == channel_id
                    && r.status == DeliveryStatus::Sent
                    && r.last_attempted_at.is_some_and(|at| at >= since)
            })
            .count() as u64)
    }

    async fn deliveries_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>, StoreError> {
        let deliveries = self.deliveries.lock().unwrap();
        Ok(deliveries
            .values()
            .filter(|r| r.created_at >= since)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Rule evaluator
// ---------------------------------------------------------------------------

/// Evaluator returning a fixed channel set, or failing on demand.
pub struct StaticEvaluator {
    channels: Vec<NotificationChannel>,
    fail: bool,
}

impl StaticEvaluator {
    pub fn returning(channels: Vec<NotificationChannel>) -> Arc<Self> {
        Arc::new(Self {
            channels,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            channels: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl RuleEvaluator for StaticEvaluator {
    async fn matching_channels(
        &self,
        _alert: &Alert,
    ) -> Result<Vec<NotificationChannel>, DeliveryError> {
        if self.fail {
            Err(DeliveryError::Evaluation("rule service unreachable".into()))
        } else {
            Ok(self.channels.clone())
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn test_alert() -> Alert {
    Alert {
        id: Uuid::new_v4(),
        alert_type: AlertType::Safety,
        severity: 85,
        source_context: json!({"message": "safety keyword detected in thread 7"}),
        status: AlertStatus::Active,
        created_at: Utc::now(),
    }
}

pub fn webhook_channel(url: &str, retry_attempts: u32) -> NotificationChannel {
    NotificationChannel {
        id: Uuid::new_v4(),
        name: "ops webhook".to_string(),
        kind: ChannelKind::Webhook,
        enabled: true,
        config: ChannelConfig {
            url: Some(url.to_string()),
            ..ChannelConfig::default()
        },
        retry_attempts,
        retry_delay_seconds: 0,
        rate_limit_per_hour: 1000,
    }
}

pub fn email_channel(retry_attempts: u32) -> NotificationChannel {
    NotificationChannel {
        id: Uuid::new_v4(),
        name: "oncall email".to_string(),
        kind: ChannelKind::Email,
        enabled: true,
        config: ChannelConfig {
            address: Some("oncall@example.com".to_string()),
            ..ChannelConfig::default()
        },
        retry_attempts,
        retry_delay_seconds: 0,
        rate_limit_per_hour: 1000,
    }
}

pub fn whatsapp_channel() -> NotificationChannel {
    NotificationChannel {
        id: Uuid::new_v4(),
        name: "oncall whatsapp".to_string(),
        kind: ChannelKind::Whatsapp,
        enabled: true,
        config: ChannelConfig {
            address: Some("+15550100100".to_string()),
            ..ChannelConfig::default()
        },
        retry_attempts: 3,
        retry_delay_seconds: 0,
        rate_limit_per_hour: 1000,
    }
}

pub fn slack_channel() -> NotificationChannel {
    NotificationChannel {
        id: Uuid::new_v4(),
        name: "alerts slack".to_string(),
        kind: ChannelKind::Slack,
        enabled: true,
        config: ChannelConfig {
            address: Some("#alerts".to_string()),
            ..ChannelConfig::default()
        },
        retry_attempts: 3,
        retry_delay_seconds: 0,
        rate_limit_per_hour: 1000,
    }
}

/// Seed a pending record tied to an alert and channel; returns its id.
pub fn seed_pending(
    store: &MemoryStore,
    alert: &Alert,
    channel: &NotificationChannel,
) -> Uuid {
    let record = DeliveryRecord::pending(alert.id, channel, Utc::now());
    let id = record.id;
    store.insert_delivery(record);
    id
}

// ---------------------------------------------------------------------------
// Wiremock responders
// ---------------------------------------------------------------------------

/// Responds with `fail_status` for the first `failures` requests, then
/// 200.
#[derive(Clone)]
pub struct FailThenSucceed {
    failures: u32,
    fail_status: u16,
    calls: Arc<AtomicU32>,
}

impl FailThenSucceed {
    pub fn new(failures: u32, fail_status: u16) -> Self {
        Self {
            failures,
            fail_status,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Respond for FailThenSucceed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            ResponseTemplate::new(self.fail_status)
        } else {
            ResponseTemplate::new(200)
        }
    }
}
