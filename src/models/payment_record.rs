use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Terminal outcome of a charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(format!("Unknown payment status: {}", s)),
        }
    }
}

/// Derived, append-style record of a charge outcome. At most one row exists
/// per (order, outcome); replayed webhook deliveries upsert into the same row.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRecord {
    pub id: String,
    pub order_id: String,
    pub status: PaymentStatus,
    /// Whole currency units, converted from the provider's minor units.
    pub amount: i64,
    pub currency: String,
    pub payment_reference: String,
    pub gateway: String,
    pub customer_email: Option<String>,
    pub branch_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
}

/// Input for the payment-record upsert, produced by the event processor and
/// persisted by the store inside the settlement transaction.
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub order_id: String,
    pub status: PaymentStatus,
    pub amount: i64,
    pub currency: String,
    pub payment_reference: String,
    pub gateway: String,
    pub customer_email: Option<String>,
    pub branch_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}
