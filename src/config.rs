use std::env;

use serde::Deserialize;

/// Sender identity for one restaurant branch. Confirmation and failure emails
/// go out under the branch that owns the order.
#[derive(Debug, Clone, Deserialize)]
pub struct BranchSender {
    pub id: String,
    pub name: String,
    pub sender_name: String,
    pub sender_email: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    /// Paystack secret key; webhook signatures are HMAC-SHA512 keyed on this.
    pub paystack_secret_key: String,
    /// Resend API key for transactional email. None disables email delivery.
    pub resend_api_key: Option<String>,
    /// Default "from" address when an order's branch has no configured sender.
    pub email_from: String,
    /// Directory the blob store persists generated invoices into.
    pub invoice_dir: String,
    /// Secret for signing invoice download URLs.
    pub url_signing_secret: String,
    pub branches: Vec<BranchSender>,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("CHOWLINE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let branches = env::var("BRANCH_SENDERS")
            .ok()
            .and_then(|raw| match serde_json::from_str(&raw) {
                Ok(list) => Some(list),
                Err(e) => {
                    tracing::warn!("Ignoring malformed BRANCH_SENDERS: {}", e);
                    None
                }
            })
            .unwrap_or_default();

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "chowline.db".to_string()),
            base_url,
            paystack_secret_key: env::var("PAYSTACK_SECRET_KEY").unwrap_or_default(),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "orders@chowline.local".to_string()),
            invoice_dir: env::var("INVOICE_DIR").unwrap_or_else(|_| "invoices".to_string()),
            url_signing_secret: env::var("URL_SIGNING_SECRET").unwrap_or_default(),
            branches,
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
