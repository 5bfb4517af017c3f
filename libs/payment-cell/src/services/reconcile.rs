use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use appointment_cell::{AppointmentStatus, BookingService};
use shared_database::SupabaseClient;
use uuid::Uuid;

use crate::error::PaymentError;
use crate::models::{ConfirmationNotice, PaymentStatus, ReconcileOutcome};
use crate::models::PaymentRecord;

/// Applies a gateway capture callback to the payment record created at
/// link-generation time. Idempotent: gateways legitimately resend callbacks
/// even after the event-level ledger deduplicated distinct deliveries.
pub struct ReconciliationService {
    supabase: Arc<SupabaseClient>,
    bookings: BookingService,
}

impl ReconciliationService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        let bookings = BookingService::new(Arc::clone(&supabase));
        Self { supabase, bookings }
    }

    pub async fn reconcile(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: Option<&str>,
        amount_minor: i64,
        currency: &str,
    ) -> Result<ReconcileOutcome, PaymentError> {
        let record = self
            .find_by_order_id(gateway_order_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(gateway_order_id.to_string()))?;

        if record.status == PaymentStatus::Captured {
            info!(
                "Payment {} already captured, verifying linked appointment",
                gateway_order_id
            );
            // A previous run may have captured the payment and then died
            // before confirming; the retry finishes the job here.
            let notification = self
                .confirm_linked_appointment(record.appointment_id, record.contact_id)
                .await?;
            return Ok(ReconcileOutcome {
                appointment_id: record.appointment_id,
                notification,
            });
        }

        if record.amount_minor != amount_minor || record.currency != currency {
            // Gateway is authoritative for the capture itself; the mismatch
            // is surfaced for manual review, not treated as a failure.
            warn!(
                "Amount mismatch on {}: recorded {} {} vs captured {} {}",
                gateway_order_id, record.amount_minor, record.currency, amount_minor, currency
            );
        }

        let path = format!("/rest/v1/payments?gateway_order_id=eq.{}", gateway_order_id);
        self.supabase
            .update(
                &path,
                json!({
                    "status": PaymentStatus::Captured,
                    "gateway_payment_id": gateway_payment_id,
                    "captured_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;

        let notification = self
            .confirm_linked_appointment(record.appointment_id, record.contact_id)
            .await?;

        info!("Payment {} captured", gateway_order_id);

        Ok(ReconcileOutcome {
            appointment_id: record.appointment_id,
            notification,
        })
    }

    /// Confirms the linked appointment if it is still pending. Returns a
    /// notification only for the run that actually flips it, so resent
    /// callbacks stay quiet.
    async fn confirm_linked_appointment(
        &self,
        appointment_id: Option<Uuid>,
        contact_id: Option<String>,
    ) -> Result<Option<ConfirmationNotice>, PaymentError> {
        let Some(appointment_id) = appointment_id else {
            return Ok(None);
        };

        let appointment = self
            .bookings
            .get(appointment_id)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        let Some(appointment) = appointment else {
            warn!("Linked appointment {} not found", appointment_id);
            return Ok(None);
        };

        if appointment.status != AppointmentStatus::Pending {
            return Ok(None);
        }

        self.bookings
            .confirm(appointment_id)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        info!("Appointment {} confirmed", appointment_id);

        Ok(contact_id.map(|contact_id| ConfirmationNotice {
            doctor_id: appointment.doctor_id,
            contact_id,
            text: "We received your payment. Your appointment is confirmed - see you soon!"
                .to_string(),
        }))
    }

    async fn find_by_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentRecord>, PaymentError> {
        let path = format!(
            "/rest/v1/payments?gateway_order_id=eq.{}&limit=1",
            gateway_order_id
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }
}
