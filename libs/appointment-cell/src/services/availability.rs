use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::error::AppointmentError;
use crate::models::{
    Appointment, AvailabilityWindow, AvailableSlot, BlockedInterval, SLOT_DURATION_MINUTES,
};

pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
}

impl AvailabilityService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Available slots for a doctor on one date: weekly windows, minus
    /// one-off blocked intervals, minus slots occupied by pending or
    /// confirmed appointments.
    pub async fn get_available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AvailableSlot>, AppointmentError> {
        debug!("Calculating available slots for doctor {} on {}", doctor_id, date);

        let day_of_week = day_index(date.weekday());

        let windows = self.fetch_windows(doctor_id, day_of_week).await?;
        if windows.is_empty() {
            return Ok(vec![]);
        }

        let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let day_end = day_start + Duration::days(1);

        let blocked = self.fetch_blocked(doctor_id, day_start, day_end).await?;
        let appointments = self.fetch_busy(doctor_id, day_start, day_end).await?;

        Ok(compute_slots(&windows, &blocked, &appointments, date))
    }

    async fn fetch_windows(
        &self,
        doctor_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<AvailabilityWindow>, AppointmentError> {
        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&day_of_week=eq.{}&order=start_time.asc",
            doctor_id, day_of_week
        );

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AppointmentError::from))
            .collect()
    }

    async fn fetch_blocked(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BlockedInterval>, AppointmentError> {
        let path = format!(
            "/rest/v1/doctor_blocked_intervals?doctor_id=eq.{}&start_time=lt.{}&end_time=gt.{}",
            doctor_id,
            to.to_rfc3339(),
            from.to_rfc3339()
        );

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AppointmentError::from))
            .collect()
    }

    async fn fetch_busy(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=in.(pending,confirmed)&start_time=lt.{}&end_time=gt.{}&order=start_time.asc",
            doctor_id,
            to.to_rfc3339(),
            from.to_rfc3339()
        );

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None).await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AppointmentError::from))
            .collect()
    }
}

fn day_index(weekday: Weekday) -> i32 {
    match weekday {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

fn overlaps(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

/// Pure slot-grid computation so the exclusion logic is testable without
/// any store behind it.
pub fn compute_slots(
    windows: &[AvailabilityWindow],
    blocked: &[BlockedInterval],
    appointments: &[Appointment],
    date: NaiveDate,
) -> Vec<AvailableSlot> {
    let duration = Duration::minutes(SLOT_DURATION_MINUTES);
    let mut slots = Vec::new();

    for window in windows {
        let window_start = date.and_time(window.start_time).and_utc();
        let window_end = date.and_time(window.end_time).and_utc();

        let mut cursor = window_start;
        while cursor + duration <= window_end {
            let slot_end = cursor + duration;

            let is_blocked = blocked
                .iter()
                .any(|b| overlaps(cursor, slot_end, b.start_time, b.end_time));
            let is_busy = appointments.iter().any(|a| {
                a.status.occupies_slot() && overlaps(cursor, slot_end, a.start_time, a.end_time)
            });

            if !is_blocked && !is_busy {
                slots.push(AvailableSlot {
                    start_time: cursor,
                    end_time: slot_end,
                });
            }

            cursor = slot_end;
        }
    }

    slots
}
