//! The payment event state machine.
//!
//! `decide` is a pure function from (order, verified event) to a settlement
//! decision. It never writes anything itself - the store applies the decision
//! transactionally, and the boundary handler triggers side effects only after
//! the commit.

use crate::models::{NewPaymentRecord, Order, OrderStatus, PaymentStatus};
use crate::payments::{ChargeEvent, PaymentEvent};

/// Minor units per whole currency unit (kobo per naira). Provider amounts
/// arrive in minor units; orders and payment records hold whole units.
const MINOR_UNITS: i64 = 100;

/// What the store should do with the order, plus the side effects to run
/// after the transaction commits.
#[derive(Debug)]
pub struct Settlement {
    pub new_status: OrderStatus,
    pub record: NewPaymentRecord,
    /// Gateway failure message, persisted on the order for failed charges
    pub payment_error: Option<String>,
    pub notice: Notice,
    /// Set when the provider-reported amount disagrees with the order total.
    /// Logged as a warning; never blocks the transition - the provider is
    /// authoritative for the charge outcome, the order for what was owed.
    pub amount_mismatch: Option<AmountMismatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountMismatch {
    /// order total in minor units
    pub expected: i64,
    /// provider-reported amount in minor units
    pub reported: i64,
}

/// Which notification the dispatcher should send post-commit.
#[derive(Debug, Clone)]
pub enum Notice {
    Paid,
    Failed { reason: String },
}

#[derive(Debug)]
pub enum Decision {
    /// Flip the order and write the payment record
    Apply(Settlement),
    /// The order already left `pending`; ack without touching anything
    AlreadySettled,
    /// Payout events: acknowledged and logged, no order mutation
    LogOnly(&'static str),
    /// Unknown event name: ack to stop provider retries, log the anomaly
    Unhandled(String),
}

pub fn decide(order: &Order, event: &PaymentEvent) -> Decision {
    match event {
        PaymentEvent::ChargeSuccess(charge) => {
            if order.status != OrderStatus::Pending {
                return Decision::AlreadySettled;
            }
            Decision::Apply(Settlement {
                new_status: OrderStatus::Paid,
                record: charge_record(order, charge, PaymentStatus::Success),
                payment_error: None,
                notice: Notice::Paid,
                amount_mismatch: check_amount(order, charge),
            })
        }
        PaymentEvent::ChargeFailed(charge) => {
            if order.status != OrderStatus::Pending {
                // A failed charge never downgrades an already-settled order.
                return Decision::AlreadySettled;
            }
            let reason = charge
                .gateway_response
                .clone()
                .unwrap_or_else(|| "Payment failed".to_string());
            Decision::Apply(Settlement {
                new_status: OrderStatus::Failed,
                record: charge_record(order, charge, PaymentStatus::Failed),
                payment_error: Some(reason.clone()),
                notice: Notice::Failed { reason },
                amount_mismatch: None,
            })
        }
        PaymentEvent::TransferSuccess { .. } => Decision::LogOnly("transfer.success"),
        PaymentEvent::TransferFailed { .. } => Decision::LogOnly("transfer.failed"),
        PaymentEvent::Unhandled(name) => Decision::Unhandled(name.clone()),
    }
}

fn charge_record(order: &Order, charge: &ChargeEvent, status: PaymentStatus) -> NewPaymentRecord {
    let amount = charge.amount / MINOR_UNITS;
    if charge.amount % MINOR_UNITS != 0 {
        // Anomalous: provider amounts are whole minor units per currency unit.
        // The raw amount survives on the record's metadata.
        tracing::warn!(
            "Charge {} amount {} is not a whole number of currency units; recording {}",
            charge.reference,
            charge.amount,
            amount
        );
    }
    NewPaymentRecord {
        order_id: order.id.clone(),
        status,
        amount,
        currency: charge.currency.clone(),
        payment_reference: charge.reference.clone(),
        gateway: "paystack".to_string(),
        customer_email: charge
            .customer_email
            .clone()
            .or_else(|| Some(order.customer.email.clone())),
        branch_id: Some(
            charge
                .branch_id
                .clone()
                .unwrap_or_else(|| order.branch_id.clone()),
        ),
        metadata: Some(charge.raw.clone()),
    }
}

fn check_amount(order: &Order, charge: &ChargeEvent) -> Option<AmountMismatch> {
    let expected = order.total_amount * MINOR_UNITS;
    if charge.amount != expected {
        Some(AmountMismatch {
            expected,
            reported: charge.amount,
        })
    } else {
        None
    }
}
