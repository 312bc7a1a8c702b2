//! Paystack webhook verification and event parsing.
//!
//! Signatures are HMAC-SHA512 over the exact raw request body, hex-encoded in
//! the `x-paystack-signature` header and keyed on the account secret key.
//! Verification must run against the raw bytes - re-serializing a parsed body
//! is not byte-identical to what the provider signed.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;
use subtle::ConstantTimeEq;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Clone)]
pub struct PaystackClient {
    secret_key: String,
}

impl PaystackClient {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
        }
    }

    /// Verify a webhook signature against the raw body bytes.
    ///
    /// Returns false on any mismatch, malformed hex, empty header, or a
    /// missing secret. The comparison is constant time.
    pub fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        if self.secret_key.is_empty() || signature.is_empty() {
            return false;
        }

        let expected = match hex::decode(signature.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let mut mac = match HmacSha512::new_from_slice(self.secret_key.as_bytes()) {
            Ok(m) => m,
            Err(_) => return false,
        };
        mac.update(body);
        let computed = mac.finalize().into_bytes();

        computed.as_slice().ct_eq(expected.as_slice()).into()
    }
}

// ============ Wire format ============

#[derive(Debug, Deserialize)]
struct WebhookBody {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChargeWire {
    reference: String,
    /// Minor currency units (kobo for NGN)
    amount: i64,
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(default)]
    gateway_response: Option<String>,
    #[serde(default)]
    customer: Option<CustomerWire>,
    #[serde(default)]
    metadata: Option<MetadataWire>,
}

fn default_currency() -> String {
    "NGN".to_string()
}

#[derive(Debug, Deserialize)]
struct CustomerWire {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataWire {
    #[serde(default, rename = "orderId")]
    order_id: Option<String>,
    #[serde(default, rename = "branchId")]
    branch_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransferWire {
    #[serde(default)]
    reference: Option<String>,
}

// ============ Parsed events ============

/// Charge outcome data, validated at the boundary before it reaches the
/// processor.
#[derive(Debug, Clone)]
pub struct ChargeEvent {
    pub reference: String,
    /// Minor currency units as reported by the provider
    pub amount: i64,
    pub currency: String,
    pub gateway_response: Option<String>,
    pub customer_email: Option<String>,
    pub order_id: Option<String>,
    pub branch_id: Option<String>,
    /// Raw provider `data` payload, persisted opaquely on the order
    pub raw: serde_json::Value,
}

impl ChargeEvent {
    /// Order id the event settles: explicit metadata first, else the charge
    /// reference (checkout uses the order id as the payment reference).
    pub fn order_id(&self) -> &str {
        self.order_id.as_deref().unwrap_or(&self.reference)
    }
}

/// Provider event, tagged by the wire `event` name.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    ChargeSuccess(ChargeEvent),
    ChargeFailed(ChargeEvent),
    /// Payout events: acknowledged and logged, never mutate orders
    TransferSuccess { reference: Option<String> },
    TransferFailed { reference: Option<String> },
    /// Recognized as a webhook but not an event this subsystem handles
    Unhandled(String),
}

impl PaymentEvent {
    pub fn event_name(&self) -> &str {
        match self {
            PaymentEvent::ChargeSuccess(_) => "charge.success",
            PaymentEvent::ChargeFailed(_) => "charge.failed",
            PaymentEvent::TransferSuccess { .. } => "transfer.success",
            PaymentEvent::TransferFailed { .. } => "transfer.failed",
            PaymentEvent::Unhandled(name) => name,
        }
    }

    /// Parse a raw webhook body. Fails only on malformed JSON or a charge
    /// event missing its required fields; unknown event names parse into
    /// `Unhandled` so the caller can ack them.
    pub fn parse(body: &[u8]) -> Result<PaymentEvent, serde_json::Error> {
        let wire: WebhookBody = serde_json::from_slice(body)?;

        match wire.event.as_str() {
            "charge.success" => Ok(PaymentEvent::ChargeSuccess(parse_charge(wire.data)?)),
            "charge.failed" => Ok(PaymentEvent::ChargeFailed(parse_charge(wire.data)?)),
            "transfer.success" => {
                let t: TransferWire = serde_json::from_value(wire.data)?;
                Ok(PaymentEvent::TransferSuccess {
                    reference: t.reference,
                })
            }
            "transfer.failed" => {
                let t: TransferWire = serde_json::from_value(wire.data)?;
                Ok(PaymentEvent::TransferFailed {
                    reference: t.reference,
                })
            }
            _ => Ok(PaymentEvent::Unhandled(wire.event)),
        }
    }
}

fn parse_charge(data: serde_json::Value) -> Result<ChargeEvent, serde_json::Error> {
    let raw = data.clone();
    let charge: ChargeWire = serde_json::from_value(data)?;
    Ok(ChargeEvent {
        reference: charge.reference,
        amount: charge.amount,
        currency: charge.currency,
        gateway_response: charge.gateway_response,
        customer_email: charge.customer.and_then(|c| c.email),
        order_id: charge.metadata.as_ref().and_then(|m| m.order_id.clone()),
        branch_id: charge.metadata.as_ref().and_then(|m| m.branch_id.clone()),
        raw,
    })
}
