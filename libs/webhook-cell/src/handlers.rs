use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use event_queue_cell::WebhookJob;
use ledger_cell::EventStatus;
use shared_models::{AppError, Provider};

use crate::services::event_id::derive_event_id;
use crate::services::signature;
use crate::state::WebhookState;

/// Subscription handshake: the channel provider probes the endpoint with a
/// verify token and expects the challenge echoed back verbatim.
pub async fn verify_subscription(
    State(state): State<Arc<WebhookState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned();

    if mode == Some("subscribe")
        && !state.config.whatsapp_verify_token.is_empty()
        && token == Some(state.config.whatsapp_verify_token.as_str())
    {
        let challenge = challenge
            .ok_or_else(|| AppError::BadRequest("missing hub.challenge".to_string()))?;
        info!("Channel subscription handshake verified");
        return Ok((StatusCode::OK, challenge).into_response());
    }

    warn!("Channel subscription handshake rejected");
    Err(AppError::Auth("verification token mismatch".to_string()))
}

/// Ingestion endpoint for provider callbacks. Authenticates the delivery,
/// records it in the idempotency ledger, and hands it to the queue; all
/// actual processing happens in the workers.
pub async fn ingest_event(
    State(state): State<Arc<WebhookState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let provider = Provider::from_path(&provider);
    let correlation_id = Uuid::new_v4();

    authenticate(&state, provider, &headers, &body, correlation_id)?;

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON payload: {}", e)))?;

    let header_event_id = headers
        .get("x-razorpay-event-id")
        .and_then(|v| v.to_str().ok());
    let event_id = derive_event_id(provider, header_event_id, &payload);

    match state.ledger.status(&event_id, provider).await {
        Ok(Some(EventStatus::Processed)) => {
            info!(%correlation_id, event_id, "Duplicate delivery of processed event, acknowledging");
            return Ok((StatusCode::OK, Json(json!({ "status": "duplicate" }))).into_response());
        }
        Ok(_) => {}
        // Fail open: a ledger outage must not make the provider drop the
        // event, and duplicate enqueues are deduplicated downstream.
        Err(e) => {
            warn!(%correlation_id, event_id, "Ledger lookup failed, accepting anyway: {}", e);
        }
    }

    if let Err(e) = state.ledger.mark_pending(&event_id, provider, correlation_id).await {
        warn!(%correlation_id, event_id, "Failed to record pending event: {}", e);
    }

    let job = WebhookJob::new(
        event_id.clone(),
        provider,
        payload.clone(),
        correlation_id.to_string(),
        state.config.max_job_attempts,
    );

    if let Err(e) = state.queue.enqueue(&job).await {
        // Queue down: archive the payload so nothing is lost, and still
        // acknowledge so the provider stops redelivering.
        warn!(%correlation_id, event_id, "Enqueue failed, archiving delivery: {}", e);
        state
            .dead_letters
            .store(&event_id, provider, &payload, &format!("enqueue failed: {}", e), 0)
            .await
            .map_err(|store_err| {
                AppError::Internal(format!("failed to archive undeliverable event: {}", store_err))
            })?;
        return Ok((StatusCode::OK, Json(json!({ "status": "archived" }))).into_response());
    }

    info!(%correlation_id, event_id, provider = %provider, "Webhook event accepted");
    Ok((StatusCode::OK, Json(json!({ "status": "accepted" }))).into_response())
}

/// Signature check over the raw body. Rejections are audited with ids only;
/// payload bytes never reach the logs.
fn authenticate(
    state: &WebhookState,
    provider: Provider,
    headers: &HeaderMap,
    body: &[u8],
    correlation_id: Uuid,
) -> Result<(), AppError> {
    let verified = match provider {
        Provider::Whatsapp => header_value(headers, "x-hub-signature-256")
            .map(|sig| signature::verify_whatsapp(&state.config.whatsapp_app_secret, body, sig))
            .unwrap_or(false),
        Provider::Razorpay => header_value(headers, "x-razorpay-signature")
            .map(|sig| signature::verify_razorpay(&state.config.razorpay_webhook_secret, body, sig))
            .unwrap_or(false),
        // No shared secret exists for unrecognized providers; the event is
        // accepted for the audit trail and ignored by the workers.
        Provider::Unknown => {
            warn!(%correlation_id, "Delivery from unrecognized provider path");
            true
        }
    };

    if !verified {
        warn!(%correlation_id, provider = %provider, "Rejected delivery with invalid signature");
        return Err(AppError::Auth("invalid webhook signature".to_string()));
    }

    Ok(())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
