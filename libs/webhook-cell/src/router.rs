use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers;
use crate::state::WebhookState;

pub fn webhook_routes(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(
            "/{provider}",
            get(handlers::verify_subscription).post(handlers::ingest_event),
        )
        .with_state(state)
}
