use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;
use shared_models::Provider;

use crate::error::LedgerError;
use crate::models::{EventStatus, IdempotencyRecord};

/// Durable map of which external event ids have been seen, keyed by
/// `(event_id, provider)`. The unique constraint on that pair is the source
/// of truth under concurrent callers; a duplicate insert means "already
/// seen", never an error.
pub struct IdempotencyLedger {
    supabase: Arc<SupabaseClient>,
}

impl IdempotencyLedger {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn status(
        &self,
        event_id: &str,
        provider: Provider,
    ) -> Result<Option<EventStatus>, LedgerError> {
        let path = format!(
            "/rest/v1/webhook_events?event_id=eq.{}&provider=eq.{}&select=status&limit=1",
            event_id, provider
        );

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        match rows.first().and_then(|row| row.get("status")) {
            Some(status) => {
                let status: EventStatus = serde_json::from_value(status.clone())?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    pub async fn mark_pending(
        &self,
        event_id: &str,
        provider: Provider,
        correlation_id: Uuid,
    ) -> Result<(), LedgerError> {
        debug!(event_id, provider = %provider, %correlation_id, "Recording pending webhook event");

        self.supabase
            .insert_ignore_duplicates(
                "/rest/v1/webhook_events?on_conflict=event_id,provider",
                json!({
                    "event_id": event_id,
                    "provider": provider.as_str(),
                    "status": EventStatus::Pending.as_str(),
                    "correlation_id": correlation_id,
                    "received_at": Utc::now().to_rfc3339(),
                    "retry_count": 0,
                }),
            )
            .await?;

        Ok(())
    }

    pub async fn mark_processed(
        &self,
        event_id: &str,
        provider: Provider,
    ) -> Result<(), LedgerError> {
        self.set_status(event_id, provider, EventStatus::Processed, None, None)
            .await
    }

    pub async fn mark_failed(
        &self,
        event_id: &str,
        provider: Provider,
        reason: &str,
        retry_count: u32,
    ) -> Result<(), LedgerError> {
        warn!(event_id, provider = %provider, retry_count, "Marking webhook event failed");
        self.set_status(
            event_id,
            provider,
            EventStatus::Failed,
            Some(reason),
            Some(retry_count),
        )
        .await
    }

    pub async fn get_record(
        &self,
        event_id: &str,
        provider: Provider,
    ) -> Result<Option<IdempotencyRecord>, LedgerError> {
        let path = format!(
            "/rest/v1/webhook_events?event_id=eq.{}&provider=eq.{}&limit=1",
            event_id, provider
        );

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    async fn set_status(
        &self,
        event_id: &str,
        provider: Provider,
        status: EventStatus,
        error_message: Option<&str>,
        retry_count: Option<u32>,
    ) -> Result<(), LedgerError> {
        let mut body = serde_json::Map::new();
        body.insert("status".to_string(), json!(status.as_str()));

        if status == EventStatus::Processed {
            body.insert("processed_at".to_string(), json!(Utc::now().to_rfc3339()));
        }
        if let Some(message) = error_message {
            body.insert("error_message".to_string(), json!(message));
        }
        if let Some(count) = retry_count {
            body.insert("retry_count".to_string(), json!(count));
        }

        let path = format!(
            "/rest/v1/webhook_events?event_id=eq.{}&provider=eq.{}",
            event_id, provider
        );

        self.supabase.update(&path, Value::Object(body)).await?;
        Ok(())
    }
}
