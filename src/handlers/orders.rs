//! Order CRUD: the upstream producer of the pending orders the webhook
//! subsystem settles, plus the operator stage advance.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::models::{CreateOrder, Order, OrderStatus};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/status", post(advance_status))
}

/// POST /orders
/// Create a pending order. The client-supplied total must reconcile with the
/// line items at creation time; it is not re-derived afterwards.
pub async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<CreateOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    if input.items.is_empty() {
        return Err(AppError::BadRequest("Order has no items".into()));
    }

    let items_total: i64 = input.items.iter().map(|i| i.price * i.quantity).sum();
    let expected = items_total + input.delivery_price;
    if input.total_amount != expected {
        return Err(AppError::BadRequest(format!(
            "Total {} does not match items + delivery ({})",
            input.total_amount, expected
        )));
    }

    let conn = state.db.get()?;
    let order = queries::create_order(&conn, &input)?;

    tracing::info!(
        "Order {} created for branch {} (total {})",
        order.id,
        order.branch_id,
        order.total_amount
    );

    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    let conn = state.db.get()?;
    let order = queries::get_order(&conn, &id)?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct AdvanceStatusRequest {
    pub status: OrderStatus,
}

/// POST /orders/{id}/status
/// Operator stage advance. Payment transitions (pending -> paid/failed) only
/// ever happen through the webhook path and are rejected here.
pub async fn advance_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AdvanceStatusRequest>,
) -> Result<Json<Order>> {
    if matches!(
        req.status,
        OrderStatus::Pending | OrderStatus::Paid | OrderStatus::Failed
    ) {
        return Err(AppError::BadRequest(format!(
            "{} is not an operator stage",
            req.status
        )));
    }

    let mut conn = state.db.get()?;
    let order = queries::update_order_status(&mut conn, &id, req.status)?;

    tracing::info!("Order {} advanced to {}", order.id, order.status);

    Ok(Json(order))
}
