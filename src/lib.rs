//! Chowline - payment reconciliation service for a restaurant ordering platform
//!
//! This library provides the core functionality for processing payment provider
//! webhooks: signature verification, the order/payment-record store, the payment
//! event state machine, and the notification + invoice side effects.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod invoice;
pub mod models;
pub mod notify;
pub mod payments;
