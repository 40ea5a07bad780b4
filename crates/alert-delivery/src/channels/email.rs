//! Email relay adapter.
//!
//! Delivery goes through the surrounding system's outbound relay: one POST
//! to `{relay}/email` carrying the recipient and the rendered message.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use super::{send_json, ChannelAdapter, NotificationMessage};
use crate::error::DeliveryError;
use crate::models::{ChannelKind, NotificationChannel};

pub struct EmailAdapter {
    client: reqwest::Client,
    relay_base_url: String,
}

impl EmailAdapter {
    #[must_use]
    pub fn new(client: reqwest::Client, relay_base_url: String) -> Self {
        Self {
            client,
            relay_base_url,
        }
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let recipient = channel.config.address.as_deref().ok_or_else(|| {
            DeliveryError::InvalidConfig(format!(
                "email channel {} has no recipient address",
                channel.id
            ))
        })?;

        let payload = json!({
            "recipient": recipient,
            "subject": message.subject,
            "body": message.body,
            "alert": message.alert,
        });

        let url = format!("{}/email", self.relay_base_url);
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
