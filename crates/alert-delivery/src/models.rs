//! Core data model for the alert notification delivery engine.
//!
//! Alerts and channels are owned by the surrounding system and read-only
//! here; the `DeliveryRecord` is the unit of work and the only entity this
//! engine mutates.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a detected alert condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Emergency,
    Urgent,
    Medical,
    Safety,
    Custom,
}

impl AlertType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Urgent => "urgent",
            Self::Medical => "medical",
            Self::Safety => "safety",
            Self::Custom => "custom",
        }
    }
}

/// Lifecycle state of an alert, managed by the detection system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Escalated,
    Resolved,
}

/// A priority alert raised by the external detection system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    /// Severity score assigned by the detector (higher is worse).
    pub severity: i32,
    /// Free-form context from the detector: triggering message, metric
    /// readings, thresholds.
    pub source_context: serde_json::Value,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

/// Destination kind for a notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Whatsapp,
    Webhook,
    Slack,
}

impl ChannelKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Whatsapp => "whatsapp",
            Self::Webhook => "webhook",
            Self::Slack => "slack",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "whatsapp" => Some(Self::Whatsapp),
            "webhook" => Some(Self::Webhook),
            "slack" => Some(Self::Slack),
            _ => None,
        }
    }
}

/// Channel-specific destination settings.
///
/// Email and WhatsApp channels use `address`; webhook channels use `url`,
/// `method`, and `headers`; Slack channels use `address` as the target
/// channel name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Recipient address (email address, phone number, slack channel).
    pub address: Option<String>,
    /// Destination URL for generic webhooks.
    pub url: Option<String>,
    /// HTTP method for generic webhooks; defaults to POST.
    pub method: Option<String>,
    /// Custom headers merged into outbound webhook requests.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// An operator-configured notification destination.
///
/// Immutable during a delivery cycle; the dispatcher reads
/// `retry_attempts`/`retry_delay_seconds` as its retry policy inputs and
/// `rate_limit_per_hour` as the rolling send budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: Uuid,
    pub name: String,
    pub kind: ChannelKind,
    pub enabled: bool,
    pub config: ChannelConfig,
    pub retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub rate_limit_per_hour: u32,
}

/// Delivery record lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Retrying,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "retrying" => Some(Self::Retrying),
            _ => None,
        }
    }

    /// Sent and failed records are never re-attempted.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// One queued/attempted send of an alert through one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub channel_id: Uuid,
    /// Mirrors the channel kind at scheduling time, for audit.
    pub method: ChannelKind,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub scheduled_at: DateTime<Utc>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DeliveryRecord {
    /// Create a fresh pending record for an alert/channel pair.
    #[must_use]
    pub fn pending(alert_id: Uuid, channel: &NotificationChannel, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_id,
            channel_id: channel.id,
            method: channel.kind,
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            scheduled_at: now,
            last_attempted_at: None,
            error_message: None,
            created_at: now,
        }
    }
}

/// Delivery success/failure breakdown over a trailing window. Derived,
/// never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    pub pending: u64,
    pub retrying: u64,
    /// Record counts keyed by delivery method name.
    pub by_method: BTreeMap<String, u64>,
    /// Rounded percentage of sent over total; 0 when there are no records.
    pub success_rate: u32,
}
