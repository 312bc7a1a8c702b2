use serde::Serialize;

/// A webhook delivery whose settlement transaction failed after a retry,
/// parked for manual reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetterEvent {
    pub id: String,
    pub order_id: String,
    pub event_type: String,
    /// Raw webhook body as received
    pub payload: String,
    pub error: String,
    pub created_at: i64,
}
