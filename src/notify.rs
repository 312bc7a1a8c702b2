//! Transactional email for order settlement.
//!
//! Confirmation and failure emails go out via the Resend HTTP API under the
//! sender identity of the branch that owns the order. Delivery failure is a
//! logged, non-fatal outcome - the order transition has already committed by
//! the time any of this runs.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::BranchSender;
use crate::error::{AppError, Result};
use crate::models::Order;

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Result of attempting to send a notification email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Email was sent via the Resend API
    Sent,
    /// No API key configured; delivery is disabled (log only)
    Disabled,
}

/// Rendered email ready for the transport.
#[derive(Debug, Clone)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

pub struct NotificationDispatcher {
    api_key: Option<String>,
    default_from: String,
    branches: Vec<BranchSender>,
    http_client: Client,
}

impl NotificationDispatcher {
    pub fn new(api_key: Option<String>, default_from: String, branches: Vec<BranchSender>) -> Self {
        Self {
            api_key,
            default_from,
            branches,
            http_client: Client::new(),
        }
    }

    /// Sender identity for a branch, falling back to the default address.
    fn sender_for(&self, branch_id: &str) -> String {
        self.branches
            .iter()
            .find(|b| b.id == branch_id)
            .map(|b| format!("{} <{}>", b.sender_name, b.sender_email))
            .unwrap_or_else(|| self.default_from.clone())
    }

    pub async fn notify_paid(&self, order: &Order, invoice_url: &str) -> Result<NotifyOutcome> {
        let content = render_paid_email(order, invoice_url);
        self.send(order, content).await
    }

    pub async fn notify_failed(&self, order: &Order, reason: &str) -> Result<NotifyOutcome> {
        let content = render_failed_email(order, reason);
        self.send(order, content).await
    }

    async fn send(&self, order: &Order, content: EmailContent) -> Result<NotifyOutcome> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                tracing::info!(
                    "Email disabled, skipping \"{}\" to {}",
                    content.subject,
                    order.customer.email
                );
                return Ok(NotifyOutcome::Disabled);
            }
        };

        let from = self.sender_for(&order.branch_id);
        let request = ResendEmailRequest {
            from: &from,
            to: vec![&order.customer.email],
            subject: &content.subject,
            text: &content.text,
            html: &content.html,
        };

        let mut last_error = None;
        for (attempt, delay) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay > 0 {
                tokio::time::sleep(Duration::from_secs(*delay)).await;
            }

            let response = self
                .http_client
                .post(RESEND_API_URL)
                .bearer_auth(api_key)
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: std::result::Result<ResendEmailResponse, _> = resp.json().await;
                    match parsed {
                        Ok(r) => tracing::info!(
                            "Email \"{}\" sent to {} (resend id {})",
                            content.subject,
                            order.customer.email,
                            r.id
                        ),
                        Err(_) => tracing::info!(
                            "Email \"{}\" sent to {}",
                            content.subject,
                            order.customer.email
                        ),
                    }
                    return Ok(NotifyOutcome::Sent);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    tracing::warn!(
                        "Resend API error on attempt {}: {} {}",
                        attempt + 1,
                        status,
                        body
                    );
                    last_error = Some(format!("Resend API returned {}", status));
                    // Client errors won't improve on retry
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Email send attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(AppError::Internal(
            last_error.unwrap_or_else(|| "Email send failed".to_string()),
        ))
    }
}

// ============ Templates ============

fn item_rows_html(order: &Order) -> String {
    order
        .items
        .iter()
        .map(|item| {
            let spec = item
                .specifications
                .as_deref()
                .map(|s| format!(" <em>({})</em>", html_escape(s)))
                .unwrap_or_default();
            format!(
                "<tr><td>{} x {}{}</td><td align=\"right\">{}</td></tr>",
                item.quantity,
                html_escape(&item.name),
                spec,
                item.price * item.quantity
            )
        })
        .collect()
}

fn item_rows_text(order: &Order) -> String {
    order
        .items
        .iter()
        .map(|item| {
            format!(
                "  {} x {}  -  {}\n",
                item.quantity,
                item.name,
                item.price * item.quantity
            )
        })
        .collect()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn render_paid_email(order: &Order, invoice_url: &str) -> EmailContent {
    let subject = format!("Order {} confirmed", order.id);

    let recipient_note = match (&order.customer.recipient_name, &order.customer.recipient_phone) {
        (Some(name), Some(phone)) => format!(
            "<p>Recipient: {} ({})</p>",
            html_escape(name),
            html_escape(phone)
        ),
        (Some(name), None) => format!("<p>Recipient: {}</p>", html_escape(name)),
        _ => String::new(),
    };

    let html = format!(
        "<h2>Thanks for your order, {}!</h2>\
         <p>Your payment was received and the kitchen is on it.</p>\
         <table width=\"100%\">{}\
         <tr><td>Delivery</td><td align=\"right\">{}</td></tr>\
         <tr><td><strong>Total</strong></td><td align=\"right\"><strong>{}</strong></td></tr>\
         </table>\
         <p>Delivering to: {}</p>{}\
         <p><a href=\"{}\">Download your invoice</a></p>",
        html_escape(&order.customer.name),
        item_rows_html(order),
        order.delivery_price,
        order.total_amount,
        html_escape(&order.customer.address),
        recipient_note,
        invoice_url,
    );

    let text = format!(
        "Thanks for your order, {}!\n\nYour payment was received.\n\n{}  Delivery  -  {}\n  Total  -  {}\n\nDelivering to: {}\n\nInvoice: {}\n",
        order.customer.name,
        item_rows_text(order),
        order.delivery_price,
        order.total_amount,
        order.customer.address,
        invoice_url,
    );

    EmailContent { subject, html, text }
}

pub fn render_failed_email(order: &Order, reason: &str) -> EmailContent {
    let subject = format!("Payment failed for order {}", order.id);

    let html = format!(
        "<h2>Sorry, {} - your payment didn't go through</h2>\
         <p>Order {} could not be charged: {}</p>\
         <p>No money left your account for this attempt. You can retry the \
         payment from your order page.</p>",
        html_escape(&order.customer.name),
        order.id,
        html_escape(reason),
    );

    let text = format!(
        "Sorry, {} - your payment didn't go through.\n\nOrder {} could not be charged: {}\n\nNo money left your account for this attempt.\n",
        order.customer.name, order.id, reason,
    );

    EmailContent { subject, html, text }
}
