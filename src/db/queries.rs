use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    query_all, query_one, DEAD_LETTER_COLS, ORDER_COLS, PAYMENT_RECORD_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// True when a rusqlite error is a UNIQUE/PRIMARY KEY violation.
fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============ Orders ============

/// Create a pending order. The id doubles as the payment reference, so a
/// duplicate id is a conflict, not an upsert.
pub fn create_order(conn: &Connection, input: &CreateOrder) -> Result<Order> {
    let id = input.id.clone().unwrap_or_else(gen_id);
    let ts = now();

    let customer = serde_json::to_string(&input.customer)?;
    let items = serde_json::to_string(&input.items)?;

    conn.execute(
        "INSERT INTO orders (id, branch_id, customer, items, delivery_price, total_amount, \
         status, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
        params![
            id,
            input.branch_id,
            customer,
            items,
            input.delivery_price,
            input.total_amount,
            ts
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            AppError::Conflict(format!("Order {} already exists", id))
        } else {
            e.into()
        }
    })?;

    get_order(conn, &id)?.ok_or_else(|| AppError::Internal("Order vanished after insert".into()))
}

pub fn get_order(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

/// Advance an operator-driven stage (paid -> processing -> out_for_delivery ->
/// delivered -> completed). Payment transitions never go through here.
pub fn update_order_status(conn: &mut Connection, id: &str, next: OrderStatus) -> Result<Order> {
    let tx = conn.transaction()?;

    let order: Order = query_one(
        &tx,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;

    if !order.status.can_advance_to(next) {
        return Err(AppError::Conflict(format!(
            "Cannot advance order from {} to {}",
            order.status, next
        )));
    }

    tx.execute(
        "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![next.as_str(), now(), id],
    )?;
    tx.commit()?;

    get_order(conn, id)?.ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))
}

// ============ Settlement ============

/// Outcome of applying a settlement decision to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Status flipped and the payment record was written
    Applied,
    /// The order had already left `pending`; nothing was changed
    AlreadyApplied,
    /// The order does not exist (race with checkout, or bogus reference)
    NotFound,
}

/// Apply a webhook settlement atomically: re-read the order inside the
/// transaction, flip pending -> paid/failed, and upsert the payment record.
/// Concurrent deliveries for the same order serialize here, not in handler
/// code. The UNIQUE(order_id, status) constraint plus the status guard make
/// redelivery a no-op.
pub fn apply_payment_decision(
    conn: &mut Connection,
    order_id: &str,
    new_status: OrderStatus,
    record: &NewPaymentRecord,
    payment_details: Option<&serde_json::Value>,
    payment_error: Option<&str>,
) -> Result<ApplyOutcome> {
    debug_assert!(matches!(new_status, OrderStatus::Paid | OrderStatus::Failed));

    let tx = conn.transaction()?;

    let current: Option<String> = tx
        .query_row(
            "SELECT status FROM orders WHERE id = ?1",
            params![order_id],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    let current = match current {
        Some(s) => s,
        None => return Ok(ApplyOutcome::NotFound),
    };

    if current != OrderStatus::Pending.as_str() {
        // Redelivery or a lost race with another delivery. State is already
        // terminal; do not touch it.
        return Ok(ApplyOutcome::AlreadyApplied);
    }

    let details = payment_details.map(serde_json::Value::to_string);
    tx.execute(
        "UPDATE orders SET status = ?1, payment_reference = ?2, payment_details = ?3, \
         payment_error = ?4, updated_at = ?5 WHERE id = ?6",
        params![
            new_status.as_str(),
            record.payment_reference,
            details,
            payment_error,
            now(),
            order_id
        ],
    )?;

    let metadata = record.metadata.as_ref().map(serde_json::Value::to_string);
    tx.execute(
        "INSERT INTO payment_records (id, order_id, status, amount, currency, \
         payment_reference, gateway, customer_email, branch_id, metadata, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
         ON CONFLICT(order_id, status) DO NOTHING",
        params![
            gen_id(),
            record.order_id,
            record.status.as_str(),
            record.amount,
            record.currency,
            record.payment_reference,
            record.gateway,
            record.customer_email,
            record.branch_id,
            metadata,
            now()
        ],
    )?;

    tx.commit()?;
    Ok(ApplyOutcome::Applied)
}

pub fn get_payment_records(conn: &Connection, order_id: &str) -> Result<Vec<PaymentRecord>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_records WHERE order_id = ?1 ORDER BY created_at",
            PAYMENT_RECORD_COLS
        ),
        &[&order_id],
    )
}

// ============ Dead letters ============

/// Park a webhook delivery that could not be settled after a retry.
pub fn record_dead_letter(
    conn: &Connection,
    order_id: &str,
    event_type: &str,
    payload: &str,
    error: &str,
) -> Result<DeadLetterEvent> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO dead_letter_events (id, order_id, event_type, payload, error, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, order_id, event_type, payload, error, now()],
    )?;

    query_one(
        conn,
        &format!("SELECT {} FROM dead_letter_events WHERE id = ?1", DEAD_LETTER_COLS),
        &[&id],
    )?
    .ok_or_else(|| AppError::Internal("Dead letter vanished after insert".into()))
}

pub fn get_dead_letters(conn: &Connection, order_id: &str) -> Result<Vec<DeadLetterEvent>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM dead_letter_events WHERE order_id = ?1 ORDER BY created_at",
            DEAD_LETTER_COLS
        ),
        &[&order_id],
    )
}
