use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;

use shared_config::AppConfig;

use crate::models::StoredMessage;

/// Fallback when the reply generator is unreachable. The patient always
/// gets an answer; generator outages never fail the job.
pub const FALLBACK_REPLY: &str =
    "Thanks for your message! You can reply 'book' any time to set up an appointment.";

pub struct ReplyGeneratorClient {
    client: Client,
    url: String,
}

impl ReplyGeneratorClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            url: config.reply_generator_url.clone(),
        }
    }

    /// Context-aware generic reply. Best-effort: any failure degrades to the
    /// canned fallback.
    pub async fn generate(&self, text: &str, intent_label: &str, history: &[StoredMessage]) -> String {
        let context: Vec<Value> = history
            .iter()
            .map(|m| json!({ "direction": m.direction, "content": m.content }))
            .collect();

        let result = self
            .client
            .post(&self.url)
            .json(&json!({
                "text": text,
                "intent": intent_label,
                "history": context,
            }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<Value>().await {
                    Ok(body) => body
                        .get("reply")
                        .and_then(Value::as_str)
                        .unwrap_or(FALLBACK_REPLY)
                        .to_string(),
                    Err(e) => {
                        warn!("Reply generator returned malformed body: {}", e);
                        FALLBACK_REPLY.to_string()
                    }
                }
            }
            Ok(response) => {
                warn!("Reply generator returned {}", response.status());
                FALLBACK_REPLY.to_string()
            }
            Err(e) => {
                warn!("Reply generator unreachable: {}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }
}
