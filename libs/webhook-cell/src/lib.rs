pub mod handlers;
pub mod router;
pub mod services;
pub mod state;

pub use router::webhook_routes;
pub use state::WebhookState;
