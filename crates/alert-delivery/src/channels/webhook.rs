//! Generic webhook adapter.
//!
//! Sends directly to the operator-configured URL with their custom headers
//! merged in. The payload is the rendered message passed through with the
//! alert metadata attached; consumers decide what to do with it.

use async_trait::async_trait;
use serde_json::json;

use super::{send_json, ChannelAdapter, NotificationMessage};
use crate::error::DeliveryError;
use crate::models::{ChannelKind, NotificationChannel};

pub struct WebhookAdapter {
    client: reqwest::Client,
}

impl WebhookAdapter {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let url = channel.config.url.as_deref().ok_or_else(|| {
            DeliveryError::InvalidConfig(format!("webhook channel {} has no URL", channel.id))
        })?;

        let method = match channel.config.method.as_deref() {
            None => reqwest::Method::POST,
            Some(m) => reqwest::Method::from_bytes(m.to_uppercase().as_bytes()).map_err(|_| {
                DeliveryError::InvalidConfig(format!("invalid HTTP method {m:?}"))
            })?,
        };

        let mut payload = json!({
            "title": message.subject,
            "body": message.body,
            "severity": message.alert.severity,
            "alert": message.alert,
        });
        if let Some(metric) = message.alert.metric {
            payload["metric"] = json!(metric);
        }
        if let Some(threshold) = message.alert.threshold {
            payload["threshold"] = json!(threshold);
        }

        send_json(
            &self.client,
            method,
            url,
            &channel.config.headers,
            &payload,
        )
        .await
    }
}
