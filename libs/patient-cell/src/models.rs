use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    None,
    Granted,
    Denied,
    Revoked,
}

/// Placeholder value written over identifying columns on revocation.
pub const ANONYMIZED: &str = "[redacted]";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    /// Stable channel contact id (e.g. the WhatsApp wa_id) this patient
    /// writes from. Unique per patient.
    pub contact_id: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub visit_reason: Option<String>,
    pub consent_status: ConsentStatus,
    pub updated_at: DateTime<Utc>,
}

/// Identifying columns that may only be written after explicit consent.
pub const CONSENTED_COLUMNS: &[&str] =
    &["full_name", "phone", "date_of_birth", "gender", "visit_reason"];
