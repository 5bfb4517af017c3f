use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conversation_cell::{ChannelDeliveryClient, ConversationEngine, FieldCache, InboundMessage};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::Provider;

const PHONE_NUMBER_ID: &str = "1060000000";
const CONTACT_ID: &str = "919900112233";

fn test_config(server: &MockServer) -> AppConfig {
    AppConfig {
        supabase_url: server.uri(),
        supabase_service_key: "test-service-key".to_string(),
        redis_url: None,
        whatsapp_app_secret: "app-secret".to_string(),
        whatsapp_verify_token: "verify-token".to_string(),
        whatsapp_api_base: server.uri(),
        razorpay_key_id: "key".to_string(),
        razorpay_key_secret: "secret".to_string(),
        razorpay_webhook_secret: "hook".to_string(),
        razorpay_api_base: server.uri(),
        intent_classifier_url: format!("{}/intent", server.uri()),
        reply_generator_url: format!("{}/reply", server.uri()),
        dead_letter_key_b64: String::new(),
        worker_concurrency: 1,
        max_job_attempts: 3,
        retry_base_secs: 1,
        retry_cap_secs: 4,
        job_visibility_timeout_secs: 30,
        request_timeout_secs: 5,
        field_cache_ttl_secs: 60,
        consultation_fee_minor: 50000,
        consultation_currency: "INR".to_string(),
    }
}

struct Fixture {
    engine: ConversationEngine,
    cache: Arc<FieldCache>,
    conversation_id: Uuid,
}

/// Mounts the mocks every turn needs: channel resolution, an existing
/// patient and conversation, persisted step, empty history, message inserts,
/// state upsert, intent classification, and outbound delivery.
async fn fixture(server: &MockServer, step: &str, intent_label: &str) -> Fixture {
    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let conversation_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "doctor_id": doctor_id,
            "phone_number_id": PHONE_NUMBER_ID,
            "access_token": "channel-token",
        }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": patient_id,
            "contact_id": CONTACT_ID,
            "full_name": null,
            "phone": null,
            "date_of_birth": null,
            "gender": null,
            "visit_reason": null,
            "consent_status": "none",
            "updated_at": "2025-06-01T10:00:00Z",
        }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": conversation_id,
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "contact_id": CONTACT_ID,
        }])))
        .mount(server)
        .await;

    let states: Vec<Value> = if step.is_empty() {
        Vec::new()
    } else {
        vec![json!({
            "conversation_id": conversation_id,
            "step": step,
            "last_intent": null,
            "collected_field_names": [],
            "consent_requested_at": null,
            "slot_selection_date": null,
            "updated_at": "2025-06-01T10:00:00Z",
        })]
    };
    Mock::given(method("GET"))
        .and(path("/rest/v1/conversation_states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(states)))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/conversation_states"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/intent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "intent": intent_label,
            "confidence": 0.97,
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/{}/messages", PHONE_NUMBER_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [] })))
        .expect(1)
        .mount(server)
        .await;

    let config = test_config(server);
    let cache = Arc::new(FieldCache::new(60));
    let engine = ConversationEngine::new(
        &config,
        Arc::new(SupabaseClient::new(&config)),
        Arc::new(ChannelDeliveryClient::new(&config)),
        Arc::clone(&cache),
    );

    Fixture { engine, cache, conversation_id }
}

fn inbound(text: &str) -> InboundMessage {
    InboundMessage {
        provider: Provider::Whatsapp,
        contact_id: CONTACT_ID.to_string(),
        phone_number_id: PHONE_NUMBER_ID.to_string(),
        message_id: format!("wamid.{}", Uuid::new_v4()),
        text: text.to_string(),
    }
}

/// The step written back by this turn's state upsert.
async fn saved_step(server: &MockServer) -> String {
    let requests = server.received_requests().await.unwrap();
    let body: Value = requests
        .iter()
        .rev()
        .find(|r| r.method == "POST" && r.url.path() == "/rest/v1/conversation_states")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .expect("a state upsert should have happened");
    body["step"].as_str().unwrap().to_string()
}

/// The text of the reply delivered on the channel this turn.
async fn delivered_reply(server: &MockServer) -> String {
    let requests = server.received_requests().await.unwrap();
    let body: Value = requests
        .iter()
        .rev()
        .find(|r| r.method == "POST" && r.url.path() == format!("/{}/messages", PHONE_NUMBER_ID))
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .expect("a reply should have been delivered");
    body["text"]["body"].as_str().unwrap().to_string()
}

async fn patient_patch(server: &MockServer) -> Option<Value> {
    let requests = server.received_requests().await.unwrap();
    requests
        .iter()
        .rev()
        .find(|r| r.method == "PATCH" && r.url.path() == "/rest/v1/patients")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
}

#[tokio::test]
async fn booking_intent_at_idle_starts_field_collection() {
    let server = MockServer::start().await;
    let fx = fixture(&server, "", "book_appointment").await;

    fx.engine
        .handle_message(&inbound("I'd like to book an appointment"))
        .await
        .expect("turn should succeed");

    assert_eq!(saved_step(&server).await, "collecting_name");
    assert!(delivered_reply(&server).await.contains("full name"));
}

#[tokio::test]
async fn invalid_phone_reprompts_without_advancing() {
    let server = MockServer::start().await;
    let fx = fixture(&server, "collecting_phone", "general").await;

    fx.engine
        .handle_message(&inbound("call me maybe"))
        .await
        .expect("turn should succeed");

    assert_eq!(saved_step(&server).await, "collecting_phone");
    assert!(delivered_reply(&server).await.contains("phone number"));
}

#[tokio::test]
async fn valid_phone_advances_to_the_next_field() {
    let server = MockServer::start().await;
    let fx = fixture(&server, "collecting_phone", "general").await;

    fx.engine
        .handle_message(&inbound("+91 99001 12233"))
        .await
        .expect("turn should succeed");

    assert_eq!(saved_step(&server).await, "collecting_date_of_birth");
    assert!(delivered_reply(&server).await.contains("date of birth"));

    // The normalized value lands in the transient cache, not the database.
    let cached = fx.cache.take(fx.conversation_id).await;
    assert_eq!(cached.get("phone"), Some(&"+919900112233".to_string()));
    assert!(patient_patch(&server).await.is_none());
}

#[tokio::test]
async fn consent_grant_persists_cached_fields() {
    let server = MockServer::start().await;
    let fx = fixture(&server, "consent", "general").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    fx.cache
        .insert(fx.conversation_id, "full_name", "Asha Rao".to_string())
        .await;
    fx.cache
        .insert(fx.conversation_id, "phone", "+919900112233".to_string())
        .await;

    fx.engine
        .handle_message(&inbound("yes"))
        .await
        .expect("turn should succeed");

    assert_eq!(saved_step(&server).await, "responded");
    let patch = patient_patch(&server).await.expect("consented fields should be written");
    assert_eq!(patch["full_name"], "Asha Rao");
    assert_eq!(patch["consent_status"], "granted");

    // Grant drains the cache.
    assert!(fx.cache.take(fx.conversation_id).await.is_empty());
}

#[tokio::test]
async fn consent_denial_discards_everything_collected() {
    let server = MockServer::start().await;
    let fx = fixture(&server, "consent", "general").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    fx.cache
        .insert(fx.conversation_id, "full_name", "Asha Rao".to_string())
        .await;

    fx.engine
        .handle_message(&inbound("no"))
        .await
        .expect("turn should succeed");

    assert_eq!(saved_step(&server).await, "responded");
    assert!(fx.cache.take(fx.conversation_id).await.is_empty());

    // Only the consent status is written; no identifying column leaks.
    let patch = patient_patch(&server).await.expect("consent status should be recorded");
    assert_eq!(patch["consent_status"], "denied");
    assert!(patch.get("full_name").is_none());
    assert!(patch.get("phone").is_none());
}

#[tokio::test]
async fn unclear_consent_reply_reprompts() {
    let server = MockServer::start().await;
    let fx = fixture(&server, "consent", "general").await;

    fx.engine
        .handle_message(&inbound("hmm what do you mean"))
        .await
        .expect("turn should succeed");

    assert_eq!(saved_step(&server).await, "consent");
    let reply = delivered_reply(&server).await;
    assert!(reply.contains("'yes'") && reply.contains("'no'"));
}

#[tokio::test]
async fn revocation_anonymizes_from_any_step() {
    let server = MockServer::start().await;
    let fx = fixture(&server, "collecting_gender", "revoke_consent").await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    fx.cache
        .insert(fx.conversation_id, "full_name", "Asha Rao".to_string())
        .await;

    fx.engine
        .handle_message(&inbound("please delete my data"))
        .await
        .expect("turn should succeed");

    assert_eq!(saved_step(&server).await, "responded");
    assert!(fx.cache.take(fx.conversation_id).await.is_empty());

    let patch = patient_patch(&server).await.expect("anonymization should be written");
    assert_eq!(patch["consent_status"], "revoked");
    assert_eq!(patch["full_name"], "[redacted]");
    assert_eq!(patch["phone"], "[redacted]");
}
