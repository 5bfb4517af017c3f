use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Payment record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<shared_database::DbError> for PaymentError {
    fn from(e: shared_database::DbError) -> Self {
        match e {
            shared_database::DbError::NotFound(msg) => PaymentError::NotFound(msg),
            other => PaymentError::Database(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(e: reqwest::Error) -> Self {
        PaymentError::Gateway(e.to_string())
    }
}
