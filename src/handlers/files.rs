//! Signed blob downloads. Serves generated invoices only when the request
//! carries a valid, unexpired signature.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::db::AppState;
use crate::error::{AppError, Result};

pub fn router() -> Router<AppState> {
    Router::new().route("/files/{*key}", get(serve_file))
}

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub sig: String,
}

/// GET /files/{key}?expires=...&sig=...
pub async fn serve_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Result<Response> {
    if !state.invoices.verify_signed(&key, query.expires, &query.sig) {
        tracing::warn!("Rejected file request with bad signature: {}", key);
        return Err(AppError::Unauthorized);
    }

    let bytes = state
        .invoices
        .fetch(&key)?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", key)))?;

    let content_type = if key.ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    };

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
