use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Order lifecycle. `pending` is the creation state; `paid`/`failed` are
/// reachable only through a verified webhook event. The later stages are
/// operator-driven and advance strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Processing,
    OutForDelivery,
    Delivered,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Processing => "processing",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
        }
    }

    /// Operator stage chain: paid -> processing -> out_for_delivery ->
    /// delivered -> completed. Payment transitions are not reachable here.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Paid, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::OutForDelivery)
                | (OrderStatus::OutForDelivery, OrderStatus::Delivered)
                | (OrderStatus::Delivered, OrderStatus::Completed)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "failed" => Ok(OrderStatus::Failed),
            "processing" => Ok(OrderStatus::Processing),
            "out_for_delivery" => Ok(OrderStatus::OutForDelivery),
            "delivered" => Ok(OrderStatus::Delivered),
            "completed" => Ok(OrderStatus::Completed),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

/// Who placed the order and where it goes. Recipient fields cover the
/// "paying for someone else" flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_phone: Option<String>,
}

/// A single menu line. `price` is a whole currency value (no minor units);
/// the provider reports amounts in minor units, converted at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub price: i64,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specifications: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    /// Opaque primary key, doubles as the payment reference sent to the provider.
    pub id: String,
    pub branch_id: String,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub delivery_price: i64,
    pub total_amount: i64,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    /// Opaque provider payload captured at settlement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    pub fn items_total(&self) -> i64 {
        self.items.iter().map(|i| i.price * i.quantity).sum()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrder {
    /// Caller-supplied id (checkout generates it so it can double as the
    /// payment reference). Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub branch_id: String,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub delivery_price: i64,
    pub total_amount: i64,
}
