pub mod paystack;
pub mod processor;

pub use paystack::handle_paystack_webhook;

use axum::{routing::post, Router};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/paystack", post(handle_paystack_webhook))
}
