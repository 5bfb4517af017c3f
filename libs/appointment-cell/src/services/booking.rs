use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::error::AppointmentError;
use crate::models::{Appointment, SLOT_DURATION_MINUTES};

/// Claims a slot or reports the lost race. The decisive check is the
/// database-level exclusion constraint on (doctor_id, time range), not the
/// pre-check: workers run in multiple processes, so an application-level
/// lock would not close the window.
pub struct BookingService {
    supabase: Arc<SupabaseClient>,
}

impl BookingService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn book(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        if start_time <= Utc::now() {
            return Err(AppointmentError::PastStartTime);
        }

        let end_time = start_time + Duration::minutes(SLOT_DURATION_MINUTES);

        // Pre-check gives a friendlier failure for the common case; the
        // insert below still decides the race.
        if self.has_overlap(doctor_id, start_time, end_time).await? {
            warn!(
                "Slot {} already occupied for doctor {}, rejecting before insert",
                start_time, doctor_id
            );
            return Err(AppointmentError::SlotConflict);
        }

        let rows = self
            .supabase
            .insert_returning(
                "/rest/v1/appointments",
                json!({
                    "id": Uuid::new_v4(),
                    "doctor_id": doctor_id,
                    "patient_id": patient_id,
                    "start_time": start_time.to_rfc3339(),
                    "end_time": end_time.to_rfc3339(),
                    "status": "pending",
                    "created_at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;

        let appointment: Appointment = rows
            .into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| AppointmentError::Database("insert returned no row".to_string()))?;

        info!(
            "Booked appointment {} for doctor {} at {}",
            appointment.id, doctor_id, start_time
        );

        Ok(appointment)
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&limit=1", appointment_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    pub async fn confirm(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        self.supabase
            .update(&path, json!({ "status": "confirmed" }))
            .await?;
        Ok(())
    }

    async fn has_overlap(
        &self,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=in.(pending,confirmed)&start_time=lt.{}&end_time=gt.{}&select=id,status&limit=1",
            doctor_id,
            end_time.to_rfc3339(),
            start_time.to_rfc3339()
        );

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;
        Ok(!rows.is_empty())
    }
}
