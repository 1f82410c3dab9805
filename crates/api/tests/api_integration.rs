//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::config::Config;
use api::routes::bookings::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use booking_store::InMemoryBookingStore;
use engine::WebhookVerifier;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn test_config() -> Config {
    Config {
        webhook_secret: "whsec_test".to_string(),
        slot_capacity: 2,
        ..Config::default()
    }
}

fn setup() -> (axum::Router, Arc<AppState<InMemoryBookingStore>>) {
    let (state, _sweeper) = api::create_default_state(InMemoryBookingStore::new(), &test_config());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn booking_request_body() -> String {
    serde_json::to_string(&serde_json::json!({
        "pro_id": uuid::Uuid::new_v4().to_string(),
        "course_id": "golf-national",
        "date": "2026-09-12",
        "start_time": "10:30:00",
        "players": 3,
        "holes": 18
    }))
    .unwrap()
}

async fn post_json(app: &axum::Router, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

async fn deliver_webhook(
    app: &axum::Router,
    event_id: &str,
    event_type: &str,
    intent_ref: &str,
) -> (StatusCode, serde_json::Value) {
    let body = format!(
        r#"{{"id":"{event_id}","type":"{event_type}","intent_ref":"{intent_ref}"}}"#
    );
    let signature = WebhookVerifier::new("whsec_test").sign(body.as_bytes());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/payments")
                .header("content-type", "application/json")
                .header("x-webhook-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, json) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "api");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_booking() {
    let (app, _) = setup();

    let (status, json) = post_json(&app, "/bookings", booking_request_body()).await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(json["booking_id"].is_string());
    assert!(json["client_payment_secret"].is_string());
    assert_eq!(json["booking"]["status"], "Pending");
    assert_eq!(json["booking"]["payment_status"], "Pending");
    assert_eq!(json["booking"]["pro_fee_cents"], 7500);
    assert_eq!(json["booking"]["platform_fee_cents"], 1500);
    assert_eq!(json["booking"]["total_cents"], 9000);
    assert!(json["booking"]["intent_ref"].is_string());
}

#[tokio::test]
async fn test_create_booking_rejects_invalid_players() {
    let (app, _) = setup();

    let body = serde_json::to_string(&serde_json::json!({
        "pro_id": uuid::Uuid::new_v4().to_string(),
        "course_id": "golf-national",
        "date": "2026-09-12",
        "start_time": "10:30:00",
        "players": 5,
        "holes": 18
    }))
    .unwrap();

    let (status, json) = post_json(&app, "/bookings", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_full_slot_returns_conflict() {
    let (app, _) = setup();
    let body = booking_request_body();

    // slot_capacity is 2 in the test config.
    let (status, _) = post_json(&app, "/bookings", body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = post_json(&app, "/bookings", body.clone()).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = post_json(&app, "/bookings", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_get_booking() {
    let (app, _) = setup();

    let (_, created) = post_json(&app, "/bookings", booking_request_body()).await;
    let id = created["booking_id"].as_str().unwrap();

    let (status, json) = get_json(&app, &format!("/bookings/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], created["booking_id"]);

    let (status, _) = get_json(&app, &format!("/bookings/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_settles_booking() {
    let (app, _) = setup();

    let (_, created) = post_json(&app, "/bookings", booking_request_body()).await;
    let id = created["booking_id"].as_str().unwrap();
    let intent = created["booking"]["intent_ref"].as_str().unwrap();

    let (status, ack) = deliver_webhook(&app, "evt_001", "payment.succeeded", intent).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "settled");

    let (_, booking) = get_json(&app, &format!("/bookings/{id}")).await;
    assert_eq!(booking["payment_status"], "Paid");
    assert_eq!(booking["status"], "Confirmed");

    // Redelivery acknowledges without changing anything.
    let (status, ack) = deliver_webhook(&app, "evt_001", "payment.succeeded", intent).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "duplicate");
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let (app, _) = setup();

    let body = r#"{"id":"evt_001","type":"payment.succeeded","intent_ref":"pi_0001"}"#;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/payments")
                .header("x-webhook-signature", "deadbeef")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Missing header entirely.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/payments")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_acknowledges_malformed_events() {
    let (app, _) = setup();
    let verifier = WebhookVerifier::new("whsec_test");

    // A correctly signed but unparseable body is acknowledged so the
    // processor stops redelivering it.
    for body in [
        "not json",
        r#"{"id":"evt_001"}"#,
        r#"{"id":"evt_002","type":"charge.created","intent_ref":"pi_0001"}"#,
    ] {
        let signature = verifier.sign(body.as_bytes());
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/payments")
                    .header("x-webhook-signature", signature)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let ack: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(ack["outcome"], "invalid_ignored");
    }
}

#[tokio::test]
async fn test_validation_decision_flow() {
    let (app, _) = setup();

    let (_, created) = post_json(&app, "/bookings", booking_request_body()).await;
    let id = created["booking_id"].as_str().unwrap();
    let intent = created["booking"]["intent_ref"].as_str().unwrap();

    // Deciding before payment is a bad request.
    let decision = serde_json::to_string(&serde_json::json!({
        "reviewer_id": uuid::Uuid::new_v4().to_string(),
        "decision": "approve"
    }))
    .unwrap();
    let (status, _) = post_json(&app, &format!("/bookings/{id}/decision"), decision.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    deliver_webhook(&app, "evt_001", "payment.succeeded", intent).await;

    let (status, json) = post_json(&app, &format!("/bookings/{id}/decision"), decision).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["decision"], "approve");
    assert_eq!(json["decided"], true);

    // A second reviewer loses the race permanently.
    let reject = serde_json::to_string(&serde_json::json!({
        "reviewer_id": uuid::Uuid::new_v4().to_string(),
        "decision": "reject",
        "notes": "duplicate listing"
    }))
    .unwrap();
    let (status, _) = post_json(&app, &format!("/bookings/{id}/decision"), reject).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, json) = get_json(&app, &format!("/bookings/{id}/validation")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["decision"], "approve");
}

#[tokio::test]
async fn test_cancel_booking() {
    let (app, _) = setup();

    let (_, created) = post_json(&app, "/bookings", booking_request_body()).await;
    let id = created["booking_id"].as_str().unwrap();
    let intent = created["booking"]["intent_ref"].as_str().unwrap();

    deliver_webhook(&app, "evt_001", "payment.succeeded", intent).await;

    let cancel = r#"{"reason":"golfer asked to cancel"}"#.to_string();
    let (status, json) = post_json(&app, &format!("/bookings/{id}/cancel"), cancel).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "Cancelled");
    assert_eq!(json["payment_status"], "Refunded");

    // Cancelling again is idempotent.
    let (status, json) =
        post_json(&app, &format!("/bookings/{id}/cancel"), "{}".to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "Cancelled");
}

#[tokio::test]
async fn test_invalid_booking_id_is_bad_request() {
    let (app, _) = setup();

    let (status, _) = get_json(&app, "/bookings/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
