use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("No doctor linked to channel {0}")]
    ChannelNotLinked(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Booking error: {0}")]
    Booking(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<shared_database::DbError> for ConversationError {
    fn from(e: shared_database::DbError) -> Self {
        ConversationError::Database(e.to_string())
    }
}

impl From<patient_cell::PatientError> for ConversationError {
    fn from(e: patient_cell::PatientError) -> Self {
        ConversationError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for ConversationError {
    fn from(e: reqwest::Error) -> Self {
        ConversationError::ExternalService(e.to_string())
    }
}
