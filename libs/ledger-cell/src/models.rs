use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::Provider;

/// Processing status of a seen event. `Processed` short-circuits every
/// future delivery of the same event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processed => "processed",
            EventStatus::Failed => "failed",
        }
    }
}

/// One row per `(event_id, provider)`. Never deleted; the table is the
/// audit trail of everything the gateway accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub event_id: String,
    pub provider: Provider,
    pub status: EventStatus,
    pub correlation_id: Uuid,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

/// A job that exhausted its retries. The payload column is sealed with
/// AES-256-GCM; only the review path decrypts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: Uuid,
    pub event_id: String,
    pub provider: Provider,
    pub encrypted_payload: String,
    pub error_message: String,
    pub retry_count: u32,
    pub failed_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}
