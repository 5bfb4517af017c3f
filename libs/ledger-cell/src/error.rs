use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Payload encryption error: {0}")]
    Crypto(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<shared_database::DbError> for LedgerError {
    fn from(e: shared_database::DbError) -> Self {
        match e {
            shared_database::DbError::NotFound(msg) => LedgerError::NotFound(msg),
            other => LedgerError::Database(other.to_string()),
        }
    }
}
