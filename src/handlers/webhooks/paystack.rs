//! Paystack webhook boundary.
//!
//! Verification runs against the raw request bytes before anything is parsed
//! or looked up; a request with a bad signature never touches the store. The
//! provider redelivers on timeout, so the whole path is idempotent.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use futures::FutureExt;
use serde_json::{json, Value};

use crate::db::{queries, queries::ApplyOutcome, AppState};
use crate::models::Order;
use crate::payments::{PaymentEvent, SIGNATURE_HEADER};

use super::processor::{decide, Decision, Notice, Settlement};

/// Response for webhook deliveries: always JSON, per the provider contract.
pub type WebhookResult = (StatusCode, Json<Value>);

fn received() -> WebhookResult {
    (StatusCode::OK, Json(json!({ "received": true })))
}

fn reject(status: StatusCode, msg: &str) -> WebhookResult {
    (status, Json(json!({ "error": msg })))
}

pub async fn handle_paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let signature = match headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(s) => s,
        None => return reject(StatusCode::BAD_REQUEST, "Missing signature header"),
    };

    // Raw bytes, before any parsing. Hashing a re-serialized body is not
    // byte-identical to what the provider signed.
    if !state.paystack.verify_webhook_signature(&body, signature) {
        tracing::warn!("Rejected webhook with invalid signature");
        return reject(StatusCode::BAD_REQUEST, "Invalid signature");
    }

    let event = match PaymentEvent::parse(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to parse Paystack webhook: {}", e);
            return reject(StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    let charge = match &event {
        PaymentEvent::ChargeSuccess(c) | PaymentEvent::ChargeFailed(c) => c,
        PaymentEvent::TransferSuccess { reference }
        | PaymentEvent::TransferFailed { reference } => {
            tracing::info!(
                "Paystack {} acknowledged (reference={:?}), no order mutation",
                event.event_name(),
                reference
            );
            return received();
        }
        PaymentEvent::Unhandled(name) => {
            tracing::warn!("Unhandled Paystack event type: {}", name);
            return received();
        }
    };

    let order_id = charge.order_id().to_string();

    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    let order = match queries::get_order(&conn, &order_id) {
        Ok(Some(o)) => o,
        Ok(None) => {
            tracing::warn!(
                "Paystack {} references unknown order {}",
                event.event_name(),
                order_id
            );
            return reject(StatusCode::NOT_FOUND, "Order not found");
        }
        Err(e) => {
            tracing::error!("DB error: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };
    drop(conn);

    match decide(&order, &event) {
        Decision::Apply(settlement) => {
            apply_settlement(&state, &order, &event, &body, settlement).await
        }
        Decision::AlreadySettled => {
            tracing::info!(
                "Order {} already {}, acknowledging {} without changes",
                order.id,
                order.status,
                event.event_name()
            );
            received()
        }
        // decide() only returns these for events the match above already
        // short-circuited; keep the arms for completeness.
        Decision::LogOnly(name) => {
            tracing::info!("Paystack {} acknowledged, no order mutation", name);
            received()
        }
        Decision::Unhandled(name) => {
            tracing::warn!("Unhandled Paystack event type: {}", name);
            received()
        }
    }
}

/// Apply a settlement through the store, retrying the transaction once and
/// parking the delivery in the dead-letter log if it still fails.
async fn apply_settlement(
    state: &AppState,
    order: &Order,
    event: &PaymentEvent,
    body: &Bytes,
    settlement: Settlement,
) -> WebhookResult {
    if let Some(mismatch) = settlement.amount_mismatch {
        tracing::warn!(
            "Amount mismatch on order {}: provider reported {} minor units, order total is {}",
            order.id,
            mismatch.reported,
            mismatch.expected
        );
    }

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    let details = settlement.record.metadata.clone();
    let mut last_err = None;
    for attempt in 0..2 {
        match queries::apply_payment_decision(
            &mut conn,
            &order.id,
            settlement.new_status,
            &settlement.record,
            details.as_ref(),
            settlement.payment_error.as_deref(),
        ) {
            Ok(ApplyOutcome::Applied) => {
                tracing::info!(
                    "Order {} settled as {} via {}",
                    order.id,
                    settlement.new_status,
                    event.event_name()
                );
                spawn_settlement_effects(state, order.clone(), settlement.notice);
                return received();
            }
            Ok(ApplyOutcome::AlreadyApplied) => {
                // Lost a race with a concurrent delivery of the same event.
                tracing::info!("Order {} was settled concurrently, acknowledging", order.id);
                return received();
            }
            Ok(ApplyOutcome::NotFound) => {
                last_err = Some("order disappeared during transaction".to_string());
                tracing::warn!(
                    "Order {} not found inside settlement transaction (attempt {})",
                    order.id,
                    attempt + 1
                );
            }
            Err(e) => {
                last_err = Some(e.to_string());
                tracing::warn!(
                    "Settlement transaction failed for order {} (attempt {}): {}",
                    order.id,
                    attempt + 1,
                    e
                );
            }
        }
    }

    // Retried and still failing: park it so it is never silently dropped.
    let error = last_err.unwrap_or_else(|| "unknown".to_string());
    let payload = String::from_utf8_lossy(body);
    if let Err(e) =
        queries::record_dead_letter(&conn, &order.id, event.event_name(), &payload, &error)
    {
        tracing::error!("Failed to record dead letter for order {}: {}", order.id, e);
    }

    reject(StatusCode::INTERNAL_SERVER_ERROR, "Settlement failed")
}

/// Run post-commit side effects. Email and invoice generation are deliberately
/// independent tasks so a slow PDF never delays the confirmation email; the
/// email links the deterministic signed invoice URL instead of waiting for
/// the bytes to exist.
fn spawn_settlement_effects(state: &AppState, order: Order, notice: Notice) {
    let notifier = state.notifier.clone();
    let invoices = state.invoices.clone();

    match notice {
        Notice::Paid => {
            let invoice_url = invoices.invoice_url(&order.id);
            let email_order = order.clone();
            spawn_logged("confirmation email", async move {
                if let Err(e) = notifier.notify_paid(&email_order, &invoice_url).await {
                    tracing::warn!(
                        "Failed to send confirmation email for order {}: {}",
                        email_order.id,
                        e
                    );
                }
            });
            spawn_logged("invoice generation", async move {
                if let Err(e) = invoices.generate(&order) {
                    tracing::warn!("Failed to generate invoice for order {}: {}", order.id, e);
                }
            });
        }
        Notice::Failed { reason } => {
            spawn_logged("failure email", async move {
                if let Err(e) = notifier.notify_failed(&order, &reason).await {
                    tracing::warn!(
                        "Failed to send failure email for order {}: {}",
                        order.id,
                        e
                    );
                }
            });
        }
    }
}

/// Fire-and-forget task spawning with panic logging. A panicking side effect
/// must never take the server down or change the webhook response.
fn spawn_logged(task: &'static str, fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(AssertUnwindSafe(fut).catch_unwind().map(move |result| {
        if let Err(panic) = result {
            let panic_msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("{} task panicked: {}", task, panic_msg);
        }
    }));
}
