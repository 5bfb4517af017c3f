use serde_json::Value;
use sha2::{Digest, Sha256};

use shared_models::Provider;

/// Derives the provider-scoped idempotency key for a delivery. Stable across
/// redeliveries of the same event: providers reuse their native ids, and the
/// fallback hashes the payload itself.
pub fn derive_event_id(provider: Provider, header_event_id: Option<&str>, payload: &Value) -> String {
    match provider {
        Provider::Whatsapp => payload
            .pointer("/entry/0/changes/0/value/messages/0/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| hash_payload(payload)),
        Provider::Razorpay => header_event_id
            .map(str::to_string)
            .or_else(|| {
                payload
                    .pointer("/payload/payment/entity/id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| hash_payload(payload)),
        Provider::Unknown => hash_payload(payload),
    }
}

fn hash_payload(payload: &Value) -> String {
    // serde_json renders object keys in a stable order, so the digest is
    // deterministic for a given payload.
    let canonical = payload.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("sha256:{}", hex::encode(digest))
}
