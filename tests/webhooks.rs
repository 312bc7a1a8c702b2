//! Webhook signature verification and settlement flow tests

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use http_body_util::BodyExt;
use tower::ServiceExt;

// ============ Signature Verification ============

#[test]
fn valid_signature_is_accepted() {
    let client = PaystackClient::new(TEST_SECRET);
    let body = b"{\"event\":\"charge.success\"}";
    let signature = paystack_signature(body, TEST_SECRET);

    assert!(
        client.verify_webhook_signature(body, &signature),
        "Valid signature should be accepted"
    );
}

#[test]
fn single_byte_mutation_is_rejected() {
    let client = PaystackClient::new(TEST_SECRET);
    let body = b"{\"event\":\"charge.success\"}".to_vec();
    let signature = paystack_signature(&body, TEST_SECRET);

    for i in 0..body.len() {
        let mut mutated = body.clone();
        mutated[i] ^= 0x01;
        assert!(
            !client.verify_webhook_signature(&mutated, &signature),
            "Mutation at byte {} should be rejected",
            i
        );
    }
}

#[test]
fn wrong_secret_is_rejected() {
    let client = PaystackClient::new(TEST_SECRET);
    let body = b"{\"event\":\"charge.success\"}";
    let signature = paystack_signature(body, "some_other_secret");

    assert!(!client.verify_webhook_signature(body, &signature));
}

#[test]
fn empty_signature_is_rejected() {
    let client = PaystackClient::new(TEST_SECRET);
    assert!(!client.verify_webhook_signature(b"{}", ""));
}

#[test]
fn malformed_hex_is_rejected() {
    let client = PaystackClient::new(TEST_SECRET);
    assert!(!client.verify_webhook_signature(b"{}", "not-hex-at-all"));
}

#[test]
fn missing_secret_rejects_everything() {
    let client = PaystackClient::new("");
    let body = b"{\"event\":\"charge.success\"}";
    let signature = paystack_signature(body, "");

    assert!(
        !client.verify_webhook_signature(body, &signature),
        "A client with no secret must reject all signatures"
    );
}

/// Regression: verification must run over the exact raw bytes. A body with
/// the same JSON meaning but different bytes (whitespace) does not verify
/// against a signature computed over the compact form.
#[test]
fn reserialized_body_does_not_verify() {
    let client = PaystackClient::new(TEST_SECRET);
    let raw = b"{ \"event\" : \"charge.success\" }";
    let signature = paystack_signature(raw, TEST_SECRET);

    assert!(
        client.verify_webhook_signature(raw, &signature),
        "The exact raw bytes should verify"
    );

    // Parse and re-serialize: same JSON value, different bytes
    let value: serde_json::Value = serde_json::from_slice(raw).unwrap();
    let reserialized = serde_json::to_vec(&value).unwrap();
    assert_ne!(raw.to_vec(), reserialized);

    assert!(
        !client.verify_webhook_signature(&reserialized, &signature),
        "A re-serialized body must not verify against the raw-body signature"
    );
}

// ============ HTTP settlement flow ============

async fn post_webhook(app: axum::Router, body: Vec<u8>, signature: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/paystack")
                .header("content-type", "application/json")
                .header("x-paystack-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn charge_success_marks_order_paid() {
    let state = create_test_app_state();
    create_test_order(&state.db.get().unwrap(), "ORD1");

    let body = charge_body("charge.success", "ORD1", 1_650_000);
    let signature = paystack_signature(&body, TEST_SECRET);

    let (status, json) = post_webhook(test_app(state.clone()), body, &signature).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received"], true);

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, "ORD1").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_reference.as_deref(), Some("ORD1"));
    assert!(order.payment_details.is_some(), "provider payload should be captured");

    let records = queries::get_payment_records(&conn, "ORD1").unwrap();
    assert_eq!(records.len(), 1, "exactly one payment record");
    assert_eq!(records[0].status, PaymentStatus::Success);
    assert_eq!(records[0].amount, 16500, "minor units converted to whole units");
    assert_eq!(records[0].gateway, "paystack");
    assert_eq!(records[0].customer_email.as_deref(), Some("ada@example.com"));
    assert_eq!(records[0].branch_id.as_deref(), Some("1"));
}

#[tokio::test]
async fn replayed_charge_success_is_idempotent() {
    let state = create_test_app_state();
    create_test_order(&state.db.get().unwrap(), "ORD1");

    let body = charge_body("charge.success", "ORD1", 1_650_000);
    let signature = paystack_signature(&body, TEST_SECRET);

    let (first, _) = post_webhook(test_app(state.clone()), body.clone(), &signature).await;
    let (second, json) = post_webhook(test_app(state.clone()), body, &signature).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK, "replay must still be acknowledged");
    assert_eq!(json["received"], true);

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, "ORD1").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);

    let records = queries::get_payment_records(&conn, "ORD1").unwrap();
    assert_eq!(records.len(), 1, "replay must not create a second record");
}

#[tokio::test]
async fn charge_failed_marks_order_failed() {
    let state = create_test_app_state();
    create_test_order(&state.db.get().unwrap(), "ORD2");

    let body = charge_body("charge.failed", "ORD2", 1_650_000);
    let signature = paystack_signature(&body, TEST_SECRET);

    let (status, _) = post_webhook(test_app(state.clone()), body, &signature).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, "ORD2").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(order.payment_error.as_deref(), Some("Declined"));

    let records = queries::get_payment_records(&conn, "ORD2").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, PaymentStatus::Failed);
}

#[tokio::test]
async fn charge_failed_never_downgrades_a_paid_order() {
    let state = create_test_app_state();
    create_test_order(&state.db.get().unwrap(), "ORD3");

    let success = charge_body("charge.success", "ORD3", 1_650_000);
    let sig = paystack_signature(&success, TEST_SECRET);
    post_webhook(test_app(state.clone()), success, &sig).await;

    let failed = charge_body("charge.failed", "ORD3", 1_650_000);
    let sig = paystack_signature(&failed, TEST_SECRET);
    let (status, _) = post_webhook(test_app(state.clone()), failed, &sig).await;

    assert_eq!(status, StatusCode::OK, "late failure events are acknowledged");

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, "ORD3").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid, "paid never reverts");

    let records = queries::get_payment_records(&conn, "ORD3").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, PaymentStatus::Success);
}

#[tokio::test]
async fn unknown_reference_returns_404_without_writes() {
    let state = create_test_app_state();

    let body = charge_body("charge.failed", "NOPE", 100_000);
    let signature = paystack_signature(&body, TEST_SECRET);

    let (status, json) = post_webhook(test_app(state.clone()), body, &signature).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());

    let conn = state.db.get().unwrap();
    assert!(queries::get_payment_records(&conn, "NOPE").unwrap().is_empty());
    assert!(queries::get_dead_letters(&conn, "NOPE").unwrap().is_empty());
}

#[tokio::test]
async fn tampered_signature_returns_400_and_never_touches_the_store() {
    let state = create_test_app_state();
    create_test_order(&state.db.get().unwrap(), "ORD4");

    let body = charge_body("charge.success", "ORD4", 1_650_000);
    let signature = paystack_signature(&body, "wrong_secret");

    let (status, json) = post_webhook(test_app(state.clone()), body, &signature).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, "ORD4").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending, "order must be untouched");
    assert!(queries::get_payment_records(&conn, "ORD4").unwrap().is_empty());
}

#[tokio::test]
async fn missing_signature_returns_400() {
    let state = create_test_app_state();
    let body = charge_body("charge.success", "ORD5", 100);

    let response = test_app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhooks/paystack")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unrecognized_event_is_acknowledged_without_mutation() {
    let state = create_test_app_state();
    create_test_order(&state.db.get().unwrap(), "ORD6");

    let body = serde_json::json!({
        "event": "subscription.create",
        "data": { "reference": "ORD6" }
    })
    .to_string()
    .into_bytes();
    let signature = paystack_signature(&body, TEST_SECRET);

    let (status, json) = post_webhook(test_app(state.clone()), body, &signature).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received"], true);

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, "ORD6").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(queries::get_payment_records(&conn, "ORD6").unwrap().is_empty());
}

#[tokio::test]
async fn transfer_events_are_log_only() {
    let state = create_test_app_state();
    create_test_order(&state.db.get().unwrap(), "ORD7");

    for event in ["transfer.success", "transfer.failed"] {
        let body = serde_json::json!({
            "event": event,
            "data": { "reference": "TRF_1" }
        })
        .to_string()
        .into_bytes();
        let signature = paystack_signature(&body, TEST_SECRET);

        let (status, json) = post_webhook(test_app(state.clone()), body, &signature).await;
        assert_eq!(status, StatusCode::OK, "{} should be acknowledged", event);
        assert_eq!(json["received"], true);
    }

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, "ORD7").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending, "transfers never touch orders");
}

#[tokio::test]
async fn amount_mismatch_still_settles_the_order() {
    let state = create_test_app_state();
    create_test_order(&state.db.get().unwrap(), "ORD8");

    // Provider reports 9999 NGN against a 16500 order: logged, not blocking
    let body = charge_body("charge.success", "ORD8", 999_900);
    let signature = paystack_signature(&body, TEST_SECRET);

    let (status, _) = post_webhook(test_app(state.clone()), body, &signature).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, "ORD8").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);

    let records = queries::get_payment_records(&conn, "ORD8").unwrap();
    assert_eq!(records[0].amount, 9999, "record keeps the provider-reported amount");
}

#[tokio::test]
async fn persistent_store_failure_parks_a_dead_letter_and_returns_500() {
    let state = create_test_app_state();
    create_test_order(&state.db.get().unwrap(), "ORD9");

    // Break the settlement transaction for every attempt
    state
        .db
        .get()
        .unwrap()
        .execute_batch("DROP TABLE payment_records")
        .unwrap();

    let body = charge_body("charge.success", "ORD9", 1_650_000);
    let signature = paystack_signature(&body, TEST_SECRET);

    let (status, json) = post_webhook(test_app(state.clone()), body, &signature).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].is_string());

    let conn = state.db.get().unwrap();
    let order = queries::get_order(&conn, "ORD9").unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending, "failed settlement must roll back");

    let parked = queries::get_dead_letters(&conn, "ORD9").unwrap();
    assert_eq!(parked.len(), 1, "the delivery must be parked, not dropped");
    assert_eq!(parked[0].event_type, "charge.success");
    assert!(parked[0].payload.contains("ORD9"), "the raw body is kept for replay");
}

#[tokio::test]
async fn malformed_json_with_valid_signature_returns_400() {
    let state = create_test_app_state();

    let body = b"not json at all".to_vec();
    let signature = paystack_signature(&body, TEST_SECRET);

    let (status, json) = post_webhook(test_app(state), body, &signature).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}
