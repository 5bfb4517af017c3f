pub mod error;
pub mod models;
pub mod services;

pub use error::PaymentError;
pub use models::*;
pub use services::link::PaymentLinkService;
pub use services::reconcile::ReconciliationService;
