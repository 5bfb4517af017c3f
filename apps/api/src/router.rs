use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::timeout::TimeoutLayer;

use webhook_cell::{webhook_routes, WebhookState};

pub fn create_router(state: Arc<WebhookState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(|| async { "Carelink gateway is running!" }))
        .nest("/webhooks", webhook_routes(state))
        // Providers redeliver on their own schedule; a stuck request must
        // come back 408 instead of holding the connection open.
        .layer(TimeoutLayer::new(request_timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn slow_router(timeout: Duration) -> Router {
        Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .layer(TimeoutLayer::new(timeout))
    }

    #[tokio::test]
    async fn stuck_request_times_out_with_408() {
        let app = slow_router(Duration::from_millis(50));

        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn fast_request_is_unaffected_by_the_timeout_layer() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(TimeoutLayer::new(Duration::from_secs(30)));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
