use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use shared_database::SupabaseClient;
use shared_models::Provider;

use crate::error::LedgerError;
use crate::models::DeadLetterRecord;
use crate::services::crypto::PayloadCipher;

/// Archive of payloads that exhausted their retries. Payloads are sealed
/// before they leave the process; reading them back requires the cipher key.
pub struct DeadLetterStore {
    supabase: Arc<SupabaseClient>,
    cipher: PayloadCipher,
}

impl DeadLetterStore {
    pub fn new(supabase: Arc<SupabaseClient>, cipher: PayloadCipher) -> Self {
        Self { supabase, cipher }
    }

    pub async fn store(
        &self,
        event_id: &str,
        provider: Provider,
        payload: &Value,
        error_message: &str,
        retry_count: u32,
    ) -> Result<Uuid, LedgerError> {
        let plaintext = serde_json::to_vec(payload)?;
        let sealed = self.cipher.seal(&plaintext)?;
        let id = Uuid::new_v4();

        error!(
            event_id,
            provider = %provider,
            retry_count,
            dead_letter_id = %id,
            "Archiving exhausted webhook job to dead letter store"
        );

        let _rows = self
            .supabase
            .insert_returning(
                "/rest/v1/webhook_dead_letters",
                json!({
                    "id": id,
                    "event_id": event_id,
                    "provider": provider.as_str(),
                    "encrypted_payload": sealed,
                    "error_message": error_message,
                    "retry_count": retry_count,
                    "failed_at": Utc::now().to_rfc3339(),
                    "resolved": false,
                }),
            )
            .await?;

        Ok(id)
    }

    pub async fn list_unresolved(&self, limit: usize) -> Result<Vec<DeadLetterRecord>, LedgerError> {
        let path = format!(
            "/rest/v1/webhook_dead_letters?resolved=eq.false&order=failed_at.asc&limit={}",
            limit
        );

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(LedgerError::from))
            .collect()
    }

    /// Authorized review path: decrypts the archived payload of one record.
    pub fn decrypt_payload(&self, record: &DeadLetterRecord) -> Result<Value, LedgerError> {
        let plaintext = self.cipher.open(&record.encrypted_payload)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    pub async fn mark_resolved(&self, id: Uuid) -> Result<(), LedgerError> {
        info!(dead_letter_id = %id, "Marking dead letter resolved");

        let path = format!("/rest/v1/webhook_dead_letters?id=eq.{}", id);
        self.supabase
            .update(
                &path,
                json!({
                    "resolved": true,
                    "resolved_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;

        Ok(())
    }
}
