use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::{AppointmentError, BookingService};
use shared_database::SupabaseClient;

fn service(server: &MockServer) -> BookingService {
    BookingService::new(Arc::new(SupabaseClient::with_base_url(
        &server.uri(),
        "test-service-key",
    )))
}

#[tokio::test]
async fn booking_a_free_slot_creates_a_pending_appointment() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let start_time = Utc::now() + Duration::days(1);
    let appointment_id = Uuid::new_v4();

    // Overlap pre-check finds nothing.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": appointment_id,
            "doctor_id": doctor_id,
            "patient_id": patient_id,
            "start_time": start_time.to_rfc3339(),
            "end_time": (start_time + Duration::minutes(30)).to_rfc3339(),
            "status": "pending",
        }])))
        .mount(&server)
        .await;

    let appointment = service(&server)
        .book(doctor_id, patient_id, start_time)
        .await
        .expect("booking should succeed");

    assert_eq!(appointment.id, appointment_id);
    assert_eq!(appointment.doctor_id, doctor_id);
}

#[tokio::test]
async fn lost_insert_race_maps_to_slot_conflict() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    // The exclusion constraint fires on insert: another worker won the slot
    // between our pre-check and our write.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "conflicting key value violates exclusion constraint"
        })))
        .mount(&server)
        .await;

    let result = service(&server)
        .book(Uuid::new_v4(), Uuid::new_v4(), Utc::now() + Duration::days(1))
        .await;

    assert_matches!(result, Err(AppointmentError::SlotConflict));
}

#[tokio::test]
async fn occupied_slot_is_rejected_before_insert() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "status": "confirmed",
        }])))
        .mount(&server)
        .await;

    let result = service(&server)
        .book(Uuid::new_v4(), Uuid::new_v4(), Utc::now() + Duration::days(1))
        .await;

    assert_matches!(result, Err(AppointmentError::SlotConflict));
}

#[tokio::test]
async fn past_start_time_is_rejected_without_touching_the_store() {
    let server = MockServer::start().await;

    let result = service(&server)
        .book(Uuid::new_v4(), Uuid::new_v4(), Utc::now() - Duration::hours(1))
        .await;

    assert_matches!(result, Err(AppointmentError::PastStartTime));
}
