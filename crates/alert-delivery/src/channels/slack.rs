//! Slack-style team chat adapter.
//!
//! Builds a block message: a header block, an optional fields section with
//! the alert's numbers, and a body section. When the alert carries metric
//! data the message is exactly three blocks; otherwise two. POSTed to the
//! `/slack` relay path nested under `message.blocks`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{send_json, ChannelAdapter, NotificationMessage};
use crate::error::DeliveryError;
use crate::models::{ChannelKind, NotificationChannel};

pub struct SlackAdapter {
    client: reqwest::Client,
    relay_base_url: String,
}

impl SlackAdapter {
    #[must_use]
    pub fn new(client: reqwest::Client, relay_base_url: String) -> Self {
        Self {
            client,
            relay_base_url,
        }
    }
}

/// Assemble the block list for a notification.
#[must_use]
pub fn build_blocks(message: &NotificationMessage) -> Vec<Value> {
    let mut blocks = vec![json!({
        "type": "header",
        "text": { "type": "plain_text", "text": message.subject },
    })];

    let mut fields = vec![json!({
        "type": "mrkdwn",
        "text": format!("*Severity:* {}", message.alert.severity),
    })];
    let mut has_metrics = false;
    if let Some(metric) = message.alert.metric {
        fields.push(json!({ "type": "mrkdwn", "text": format!("*Metric:* {metric}") }));
        has_metrics = true;
    }
    if let Some(threshold) = message.alert.threshold {
        fields.push(json!({ "type": "mrkdwn", "text": format!("*Threshold:* {threshold}") }));
        has_metrics = true;
    }
    if has_metrics {
        blocks.push(json!({ "type": "section", "fields": fields }));
    }

    blocks.push(json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": message.body },
    }));

    blocks
}

#[async_trait]
impl ChannelAdapter for SlackAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let target = channel.config.address.as_deref().ok_or_else(|| {
            DeliveryError::InvalidConfig(format!(
                "slack channel {} has no target channel",
                channel.id
            ))
        })?;

        let payload = json!({
            "recipient": target,
            "title": message.subject,
            "message": { "blocks": build_blocks(message) },
            "alert": message.alert,
        });

        let url = format!("{}/slack", self.relay_base_url);
        send_json(
            &self.client,
            reqwest::Method::POST,
            &url,
            &HashMap::new(),
            &payload,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::AlertContext;
    use crate::models::AlertType;
    use chrono::Utc;
    use uuid::Uuid;

    fn message(metric: Option<f64>, threshold: Option<f64>) -> NotificationMessage {
        NotificationMessage {
            subject: "[SAFETY] Priority alert (severity 72)".to_string(),
            body: "keyword match in thread 19".to_string(),
            alert: AlertContext {
                id: Uuid::new_v4(),
                alert_type: AlertType::Safety,
                severity: 72,
                created_at: Utc::now(),
                metric,
                threshold,
            },
        }
    }

    #[test]
    fn three_blocks_with_metric_fields() {
        let blocks = build_blocks(&message(Some(12.0), Some(10.0)));
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["type"], "header");
        assert_eq!(blocks[1]["type"], "section");
        assert_eq!(blocks[1]["fields"].as_array().unwrap().len(), 3);
        assert_eq!(blocks[2]["type"], "section");
    }

    #[test]
    fn two_blocks_without_metric_fields() {
        let blocks = build_blocks(&message(None, None));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["type"], "header");
        assert_eq!(blocks[1]["type"], "section");
        assert!(blocks[1].get("fields").is_none());
    }

    #[test]
    fn metric_alone_still_adds_fields_section() {
        let blocks = build_blocks(&message(Some(5.5), None));
        assert_eq!(blocks.len(), 3);
        let fields = blocks[1]["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields[1]["text"].as_str().unwrap().contains("5.5"));
    }
}
