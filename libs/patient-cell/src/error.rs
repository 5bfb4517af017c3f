use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatientError {
    #[error("Patient not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<shared_database::DbError> for PatientError {
    fn from(e: shared_database::DbError) -> Self {
        match e {
            shared_database::DbError::NotFound(msg) => PatientError::NotFound(msg),
            other => PatientError::Database(other.to_string()),
        }
    }
}
