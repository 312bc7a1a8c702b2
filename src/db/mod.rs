mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::invoice::InvoiceGenerator;
use crate::notify::NotificationDispatcher;
use crate::payments::PaystackClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state constructed once at startup and passed by dependency
/// injection into every handler. No hidden globals.
#[derive(Clone)]
pub struct AppState {
    /// Orders, payment records, and the dead-letter log
    pub db: DbPool,
    /// Base URL for links embedded in emails and signed invoice URLs
    pub base_url: String,
    pub paystack: PaystackClient,
    pub notifier: Arc<NotificationDispatcher>,
    pub invoices: Arc<InvoiceGenerator>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
