use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;

use crate::error::ConversationError;
use crate::models::{Intent, IntentResult};

/// Client for the external intent classifier. The classifier is a black box
/// returning a label and a confidence; outages propagate so the queue can
/// retry the whole job.
pub struct IntentClassifierClient {
    client: Client,
    url: String,
}

impl IntentClassifierClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            url: config.intent_classifier_url.clone(),
        }
    }

    pub async fn classify(&self, text: &str) -> Result<IntentResult, ConversationError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConversationError::ExternalService(format!(
                "intent classifier returned {}",
                status
            )));
        }

        let body: Value = response.json().await?;
        let label = body
            .get("intent")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let confidence = body.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);

        debug!("Classified intent '{}' ({:.2})", label, confidence);

        Ok(IntentResult {
            intent: Intent::from_label(&label),
            label,
            confidence,
        })
    }
}
