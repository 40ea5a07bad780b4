//! Channel adapters.
//!
//! One adapter per destination kind. An adapter does exactly one thing:
//! turn a rendered notification into the channel's wire shape, perform one
//! HTTP call, and map the response into a typed `DeliveryError`. Adapters
//! never retry and never panic; classification and retrying live above
//! them in the retry engine and dispatcher.

pub mod email;
pub mod slack;
pub mod webhook;
pub mod whatsapp;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::models::{Alert, AlertType, ChannelKind, NotificationChannel};

pub use email::EmailAdapter;
pub use slack::SlackAdapter;
pub use webhook::WebhookAdapter;
pub use whatsapp::WhatsappAdapter;

/// Alert fields carried on every outbound payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertContext {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: i32,
    pub created_at: DateTime<Utc>,
    /// Metric reading from the detector, when the alert carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<f64>,
    /// Threshold the metric crossed, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

/// A rendered notification ready for any channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub subject: String,
    pub body: String,
    pub alert: AlertContext,
}

impl NotificationMessage {
    /// Render a notification from an alert.
    ///
    /// The subject carries the alert type and severity; the body prefers a
    /// `message` field in the detector's source context and falls back to
    /// the raw context. Optional `metric`/`threshold` numbers are lifted
    /// out of the context for channels that display them.
    #[must_use]
    pub fn from_alert(alert: &Alert) -> Self {
        let body = alert
            .source_context
            .get("message")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| alert.source_context.to_string());

        Self {
            subject: format!(
                "[{}] Priority alert (severity {})",
                alert.alert_type.as_str().to_uppercase(),
                alert.severity
            ),
            body,
            alert: AlertContext {
                id: alert.id,
                alert_type: alert.alert_type,
                severity: alert.severity,
                created_at: alert.created_at,
                metric: alert.source_context.get("metric").and_then(|v| v.as_f64()),
                threshold: alert
                    .source_context
                    .get("threshold")
                    .and_then(|v| v.as_f64()),
            },
        }
    }
}

/// A single destination kind's send capability.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver one notification through the channel.
    ///
    /// Any non-2xx status or transport failure comes back as an `Err`
    /// carrying enough structure for retry classification; the adapter
    /// itself makes exactly one attempt.
    async fn send(
        &self,
        channel: &NotificationChannel,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError>;
}

/// The closed set of adapters, one per channel kind.
pub struct AdapterSet {
    email: EmailAdapter,
    whatsapp: WhatsappAdapter,
    webhook: WebhookAdapter,
    slack: SlackAdapter,
}

impl AdapterSet {
    #[must_use]
    pub fn new(client: reqwest::Client, relay_base_url: String) -> Self {
        let relay = relay_base_url.trim_end_matches('/').to_string();
        Self {
            email: EmailAdapter::new(client.clone(), relay.clone()),
            whatsapp: WhatsappAdapter::new(client.clone(), relay.clone()),
            webhook: WebhookAdapter::new(client.clone()),
            slack: SlackAdapter::new(client, relay),
        }
    }

    #[must_use]
    pub fn get(&self, kind: ChannelKind) -> &dyn ChannelAdapter {
        match kind {
            ChannelKind::Email => &self.email,
            ChannelKind::Whatsapp => &self.whatsapp,
            ChannelKind::Webhook => &self.webhook,
            ChannelKind::Slack => &self.slack,
        }
    }
}

/// Issue one JSON request and map the response into the error taxonomy.
///
/// 2xx is success; anything else is `Http { status }`. Transport failures
/// split into timeout and connection variants so classification stays
/// structural.
pub(crate) async fn send_json(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    headers: &HashMap<String, String>,
    body: &serde_json::Value,
) -> Result<(), DeliveryError> {
    let mut request = client.request(method, url).json(body);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            DeliveryError::Timeout
        } else if e.is_connect() {
            DeliveryError::Connection(format!("connect to {url} failed: {e}"))
        } else {
            DeliveryError::Connection(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(DeliveryError::Http {
            status: status.as_u16(),
        })
    }
}
