pub mod files;
pub mod orders;
pub mod webhooks;

use axum::Router;

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(orders::router())
        .merge(webhooks::router())
        .merge(files::router())
}
