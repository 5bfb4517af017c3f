use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Requested start time is in the past")]
    PastStartTime,

    #[error("Slot no longer available")]
    SlotConflict,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<shared_database::DbError> for AppointmentError {
    fn from(e: shared_database::DbError) -> Self {
        match e {
            // The exclusion constraint on (doctor_id, time range) reports
            // the lost race as a conflict.
            shared_database::DbError::Conflict(_) => AppointmentError::SlotConflict,
            other => AppointmentError::Database(other.to_string()),
        }
    }
}
