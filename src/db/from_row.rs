//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse a JSON TEXT column.
fn parse_json<T: serde::de::DeserializeOwned>(
    row: &Row,
    col: usize,
    col_name: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(&row.get::<_, String>(col)?).map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse an optional JSON TEXT column.
fn parse_json_opt(row: &Row, col: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    Ok(row
        .get::<_, Option<String>>(col)?
        .and_then(|s| serde_json::from_str(&s).ok()))
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const ORDER_COLS: &str = "id, branch_id, customer, items, delivery_price, total_amount, \
     status, payment_reference, payment_details, payment_error, created_at, updated_at";

pub const PAYMENT_RECORD_COLS: &str = "id, order_id, status, amount, currency, \
     payment_reference, gateway, customer_email, branch_id, metadata, created_at";

pub const DEAD_LETTER_COLS: &str = "id, order_id, event_type, payload, error, created_at";

// ============ FromRow Implementations ============

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            branch_id: row.get(1)?,
            customer: parse_json(row, 2, "customer")?,
            items: parse_json(row, 3, "items")?,
            delivery_price: row.get(4)?,
            total_amount: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            payment_reference: row.get(7)?,
            payment_details: parse_json_opt(row, 8)?,
            payment_error: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for PaymentRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentRecord {
            id: row.get(0)?,
            order_id: row.get(1)?,
            status: parse_enum(row, 2, "status")?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            payment_reference: row.get(5)?,
            gateway: row.get(6)?,
            customer_email: row.get(7)?,
            branch_id: row.get(8)?,
            metadata: parse_json_opt(row, 9)?,
            created_at: row.get(10)?,
        })
    }
}

impl FromRow for DeadLetterEvent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DeadLetterEvent {
            id: row.get(0)?,
            order_id: row.get(1)?,
            event_type: row.get(2)?,
            payload: row.get(3)?,
            error: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}
