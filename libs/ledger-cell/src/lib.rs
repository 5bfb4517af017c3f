pub mod error;
pub mod models;
pub mod services;

pub use error::LedgerError;
pub use models::*;
pub use services::crypto::PayloadCipher;
pub use services::dead_letter::DeadLetterStore;
pub use services::ledger::IdempotencyLedger;
