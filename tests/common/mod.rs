//! Test utilities and fixtures for chowline integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use chowline::db::{init_db, queries, AppState};
pub use chowline::handlers;
pub use chowline::invoice::{FsBlobStore, InvoiceGenerator};
pub use chowline::models::*;
pub use chowline::notify::NotificationDispatcher;
pub use chowline::payments::PaystackClient;

/// Webhook secret used across tests
pub const TEST_SECRET: &str = "sk_test_chowline_secret";

/// Signing secret for invoice URLs
pub const TEST_SIGNING_SECRET: &str = "test-signing-secret";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Temp directory for blob storage, unique per test
pub fn test_blob_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("chowline-test-{}", uuid::Uuid::new_v4()))
}

/// Create an AppState for testing with an in-memory database.
/// Pool size 1 so every request sees the same in-memory database.
pub fn create_test_app_state() -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    let store = Arc::new(FsBlobStore::new(test_blob_dir()));
    let invoices = Arc::new(InvoiceGenerator::new(
        store,
        "http://localhost:3000".to_string(),
        TEST_SIGNING_SECRET.to_string(),
    ));

    AppState {
        db: pool,
        base_url: "http://localhost:3000".to_string(),
        paystack: PaystackClient::new(TEST_SECRET),
        notifier: Arc::new(NotificationDispatcher::new(
            None,
            "test@chowline.local".to_string(),
            vec![],
        )),
        invoices,
    }
}

/// Create a Router with all endpoints
pub fn test_app(state: AppState) -> Router {
    handlers::router().with_state(state)
}

/// A pending test order: 3 x Jollof Rice (5000) + 1500 delivery = 16500
pub fn test_order_input(id: &str) -> CreateOrder {
    CreateOrder {
        id: Some(id.to_string()),
        branch_id: "1".to_string(),
        customer: Customer {
            name: "Ada Obi".to_string(),
            email: "ada@example.com".to_string(),
            phone: "+2348012345678".to_string(),
            address: "14 Marina Road, Lagos".to_string(),
            recipient_name: None,
            recipient_phone: None,
        },
        items: vec![OrderItem {
            name: "Jollof Rice".to_string(),
            price: 5000,
            quantity: 3,
            specifications: Some("extra spicy".to_string()),
        }],
        delivery_price: 1500,
        total_amount: 16500,
    }
}

/// Create a pending test order directly through the store
pub fn create_test_order(conn: &Connection, id: &str) -> Order {
    queries::create_order(conn, &test_order_input(id)).expect("Failed to create test order")
}

/// Compute a valid Paystack signature (hex HMAC-SHA512 of the raw body)
pub fn paystack_signature(body: &[u8], secret: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// A charge webhook body for the given order id and amount in minor units
pub fn charge_body(event: &str, order_id: &str, amount_minor: i64) -> Vec<u8> {
    serde_json::json!({
        "event": event,
        "data": {
            "reference": order_id,
            "amount": amount_minor,
            "currency": "NGN",
            "status": if event == "charge.success" { "success" } else { "failed" },
            "gateway_response": if event == "charge.success" { "Successful" } else { "Declined" },
            "customer": { "email": "ada@example.com" },
            "metadata": { "orderId": order_id, "branchId": "1" }
        }
    })
    .to_string()
    .into_bytes()
}
