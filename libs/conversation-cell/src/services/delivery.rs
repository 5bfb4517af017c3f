use reqwest::Client;
use serde_json::json;
use tracing::debug;

use shared_config::AppConfig;

use crate::error::ConversationError;
use crate::models::DoctorChannel;

/// Sends replies through the WhatsApp Cloud API using the per-doctor
/// channel credentials.
pub struct ChannelDeliveryClient {
    client: Client,
    api_base: String,
}

impl ChannelDeliveryClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: config.whatsapp_api_base.clone(),
        }
    }

    pub async fn send(
        &self,
        channel: &DoctorChannel,
        recipient: &str,
        text: &str,
    ) -> Result<(), ConversationError> {
        debug!(
            "Sending reply via channel {} to {}",
            channel.phone_number_id, recipient
        );

        let response = self
            .client
            .post(format!(
                "{}/{}/messages",
                self.api_base, channel.phone_number_id
            ))
            .bearer_auth(&channel.access_token)
            .json(&json!({
                "messaging_product": "whatsapp",
                "to": recipient,
                "type": "text",
                "text": { "body": text },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConversationError::ExternalService(format!(
                "channel delivery failed ({}): {}",
                status, body
            )));
        }

        Ok(())
    }
}
