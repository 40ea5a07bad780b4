//! WhatsApp-style chat relay adapter.
//!
//! Mirrors the email adapter against the `/whatsapp` relay path; the relay
//! owns the provider integration, this side only ships the message.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use super::{send_json, ChannelAdapter, NotificationMessage};
use crate::error::DeliveryError;
use crate::models::{ChannelKind, NotificationChannel};

pub struct WhatsappAdapter {
    client: reqwest::Client,
    relay_base_url: String,
}

impl WhatsappAdapter {
    #[must_use]
    pub fn new(client: reqwest::Client, relay_base_url: String) -> Self {
        Self {
            client,
            relay_base_url,
        }
    }
}

#[async_trait]
impl ChannelAdapter for WhatsappAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Whatsapp
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        message: &NotificationMessage,
    ) -> Result<(), DeliveryError> {
        let recipient = channel.config.address.as_deref().ok_or_else(|| {
            DeliveryError::InvalidConfig(format!(
                "whatsapp channel {} has no recipient number",
                channel.id
            ))
        })?;

        let payload = json!({
            "recipient": recipient,
            "subject": message.subject,
            "body": message.body,
            "alert": message.alert,
        });

        let url = format!("{}/whatsapp", self.relay_base_url);
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
