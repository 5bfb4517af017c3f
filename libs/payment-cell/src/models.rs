use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Captured,
    Failed,
}

/// Row created at link-generation time and reconciled by the gateway
/// callback, keyed by `gateway_order_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub appointment_id: Option<Uuid>,
    /// Channel contact to notify once the payment is captured.
    pub contact_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub link_url: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLink {
    pub url: String,
    pub gateway_order_id: String,
}

/// What the worker should tell the patient after a successful capture.
/// Delivery is best-effort and happens outside this cell.
#[derive(Debug, Clone)]
pub struct ConfirmationNotice {
    /// Doctor whose channel the notice goes out on.
    pub doctor_id: Uuid,
    pub contact_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub appointment_id: Option<Uuid>,
    pub notification: Option<ConfirmationNotice>,
}
