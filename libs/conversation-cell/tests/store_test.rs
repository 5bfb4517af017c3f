use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param_contains};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conversation_cell::services::store::ConversationStore;
use conversation_cell::{ConversationStep, InboundMessage};
use shared_database::SupabaseClient;
use shared_models::Provider;

fn store(server: &MockServer) -> ConversationStore {
    ConversationStore::new(Arc::new(SupabaseClient::with_base_url(
        &server.uri(),
        "test-service-key",
    )))
}

#[tokio::test]
async fn unseen_conversation_starts_at_idle() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversation_states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let state = store(&server)
        .load_or_create_state(Uuid::new_v4())
        .await
        .expect("state load should succeed");

    assert_eq!(state.step, ConversationStep::Idle);
    assert!(state.collected_field_names.is_empty());
}

#[tokio::test]
async fn persisted_step_string_is_restored() {
    let server = MockServer::start().await;
    let conversation_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/conversation_states"))
        .and(query_param_contains("conversation_id", &conversation_id.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "conversation_id": conversation_id,
            "step": "collecting_phone",
            "last_intent": "book_appointment",
            "collected_field_names": ["name"],
            "consent_requested_at": null,
            "slot_selection_date": null,
            "updated_at": "2025-06-01T10:00:00Z",
        }])))
        .mount(&server)
        .await;

    let state = store(&server)
        .load_or_create_state(conversation_id)
        .await
        .expect("state load should succeed");

    assert_eq!(state.step.as_str(), "collecting_phone");
    assert_eq!(state.collected_field_names, vec!["name".to_string()]);
}

#[tokio::test]
async fn redelivered_message_insert_is_accepted_as_duplicate() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/messages"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let message = InboundMessage {
        provider: Provider::Whatsapp,
        contact_id: "919900112233".to_string(),
        phone_number_id: "1060000000".to_string(),
        message_id: "wamid.DUP".to_string(),
        text: "hello again".to_string(),
    };

    store(&server)
        .insert_inbound(Uuid::new_v4(), &message)
        .await
        .expect("duplicate insert should be accepted");
}
