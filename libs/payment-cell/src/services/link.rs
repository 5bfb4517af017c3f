use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::error::PaymentError;
use crate::models::{PaymentLink, PaymentStatus};

/// Provider-agnostic payment-link adapter backed by the Razorpay
/// payment-links API. Creating a link also records the payment row the
/// reconciliation path later looks up by `gateway_order_id`.
pub struct PaymentLinkService {
    client: Client,
    supabase: Arc<SupabaseClient>,
    api_base: String,
    key_id: String,
    key_secret: String,
}

impl PaymentLinkService {
    pub fn new(config: &AppConfig, supabase: Arc<SupabaseClient>) -> Self {
        Self {
            client: Client::new(),
            supabase,
            api_base: config.razorpay_api_base.clone(),
            key_id: config.razorpay_key_id.clone(),
            key_secret: config.razorpay_key_secret.clone(),
        }
    }

    pub async fn create_link(
        &self,
        amount_minor: i64,
        currency: &str,
        appointment_id: Uuid,
        contact_id: &str,
    ) -> Result<PaymentLink, PaymentError> {
        debug!(
            "Creating payment link for appointment {} ({} {})",
            appointment_id, amount_minor, currency
        );

        let response = self
            .client
            .post(format!("{}/payment_links", self.api_base))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount_minor,
                "currency": currency,
                "reference_id": appointment_id,
                "description": "Consultation fee",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Gateway(format!(
                "payment link creation failed ({}): {}",
                status, body
            )));
        }

        let body: Value = response.json().await?;
        let gateway_order_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| PaymentError::Gateway("link response missing id".to_string()))?
            .to_string();
        let url = body
            .get("short_url")
            .and_then(Value::as_str)
            .ok_or_else(|| PaymentError::Gateway("link response missing short_url".to_string()))?
            .to_string();

        self.supabase
            .insert_returning(
                "/rest/v1/payments",
                json!({
                    "id": Uuid::new_v4(),
                    "gateway_order_id": gateway_order_id,
                    "appointment_id": appointment_id,
                    "contact_id": contact_id,
                    "amount_minor": amount_minor,
                    "currency": currency,
                    "status": PaymentStatus::Created,
                    "link_url": url,
                    "created_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;

        info!(
            "Payment link {} created for appointment {}",
            gateway_order_id, appointment_id
        );

        Ok(PaymentLink {
            url,
            gateway_order_id,
        })
    }
}
