pub mod error;
pub mod models;
pub mod services;

pub use error::PatientError;
pub use models::*;
pub use services::patient::PatientService;
