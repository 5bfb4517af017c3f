use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param_contains};
use wiremock::{Mock, MockServer, ResponseTemplate};

use payment_cell::{PaymentError, ReconciliationService};
use shared_database::SupabaseClient;

fn service(server: &MockServer) -> ReconciliationService {
    ReconciliationService::new(Arc::new(SupabaseClient::with_base_url(
        &server.uri(),
        "test-service-key",
    )))
}

fn payment_row(order_id: &str, status: &str, appointment_id: Uuid) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "gateway_order_id": order_id,
        "gateway_payment_id": null,
        "appointment_id": appointment_id,
        "contact_id": "919900112233",
        "amount_minor": 50000,
        "currency": "INR",
        "status": status,
        "link_url": "https://rzp.io/l/test",
        "captured_at": null,
    })
}

fn appointment_row(id: Uuid, doctor_id: Uuid, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "doctor_id": doctor_id,
        "patient_id": Uuid::new_v4(),
        "start_time": "2025-06-02T09:00:00Z",
        "end_time": "2025-06-02T09:30:00Z",
        "status": status,
    })
}

#[tokio::test]
async fn capture_marks_record_and_confirms_appointment() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, doctor_id, "pending")
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([payment_row("plink_1", "created", appointment_id)])),
        )
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param_contains("id", &appointment_id.to_string()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = service(&server)
        .reconcile("plink_1", Some("pay_9"), 50000, "INR")
        .await
        .expect("reconcile should succeed");

    assert_eq!(outcome.appointment_id, Some(appointment_id));
    let notice = outcome.notification.expect("capture should produce a notification");
    assert_eq!(notice.contact_id, "919900112233");
    assert_eq!(notice.doctor_id, doctor_id);
}

#[tokio::test]
async fn already_captured_payment_is_a_no_op() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([payment_row("plink_1", "captured", appointment_id)])),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, Uuid::new_v4(), "confirmed")
        ])))
        .mount(&server)
        .await;

    // No writes may happen on a resent callback.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = service(&server)
        .reconcile("plink_1", Some("pay_9"), 50000, "INR")
        .await
        .expect("repeat reconcile should still succeed");

    assert_eq!(outcome.appointment_id, Some(appointment_id));
    assert!(outcome.notification.is_none());
}

#[tokio::test]
async fn retry_after_interrupted_capture_still_confirms_appointment() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    // Payment already captured, but the previous run died before the
    // appointment was confirmed.
    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([payment_row("plink_1", "captured", appointment_id)])),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, doctor_id, "pending")
        ])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param_contains("id", &appointment_id.to_string()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = service(&server)
        .reconcile("plink_1", Some("pay_9"), 50000, "INR")
        .await
        .expect("retry reconcile should succeed");

    let notice = outcome.notification.expect("the healing run should notify the patient");
    assert_eq!(notice.doctor_id, doctor_id);
}

#[tokio::test]
async fn unknown_order_id_is_reported_for_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = service(&server).reconcile("plink_missing", None, 100, "INR").await;
    assert_matches!(result, Err(PaymentError::NotFound(_)));
}
