//! Invoice generation and blob storage.
//!
//! An invoice is a minimal single-page PDF persisted to blob storage under a
//! key derived from the order id, retrievable through a time-limited signed
//! URL. The URL is deterministic for a given order, so the confirmation email
//! can link it without waiting for the bytes to exist; generation runs as an
//! independent post-commit task.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use crate::models::Order;

type HmacSha256 = Hmac<Sha256>;

/// Signed URLs stay valid for a week; long enough for a customer to revisit
/// the confirmation email.
const SIGNED_URL_TTL_SECS: i64 = 7 * 24 * 3600;

/// Blob storage boundary. The filesystem implementation below is the default;
/// cloud object storage slots in behind the same trait.
pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Filesystem-backed blob store rooted at a configured directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        // Keys are server-derived, but the store also backs the public file
        // handler; never let a key escape the root.
        if key.split('/').any(|seg| seg == ".." || seg.is_empty()) || Path::new(key).is_absolute()
        {
            return Err(AppError::BadRequest(format!("Invalid blob key: {}", key)));
        }
        Ok(self.root.join(key))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Internal(format!("Blob mkdir failed: {}", e)))?;
        }
        fs::write(&path, bytes)
            .map_err(|e| AppError::Internal(format!("Blob write failed: {}", e)))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Internal(format!("Blob read failed: {}", e))),
        }
    }
}

pub struct InvoiceGenerator {
    store: Arc<dyn BlobStore>,
    base_url: String,
    signing_secret: String,
}

impl InvoiceGenerator {
    pub fn new(store: Arc<dyn BlobStore>, base_url: String, signing_secret: String) -> Self {
        Self {
            store,
            base_url,
            signing_secret,
        }
    }

    pub fn invoice_key(order_id: &str) -> String {
        format!("invoices/{}.pdf", order_id)
    }

    /// Deterministic signed URL for an order's invoice.
    pub fn invoice_url(&self, order_id: &str) -> String {
        let key = Self::invoice_key(order_id);
        let expires = Utc::now().timestamp() + SIGNED_URL_TTL_SECS;
        let sig = self.sign(&key, expires);
        format!(
            "{}/files/{}?expires={}&sig={}",
            self.base_url, key, expires, sig
        )
    }

    /// Render the order into a PDF, persist it, and return the signed URL.
    pub fn generate(&self, order: &Order) -> Result<String> {
        let pdf = render_pdf(order);
        let key = Self::invoice_key(&order.id);
        self.store.put(&key, &pdf, "application/pdf")?;
        tracing::info!("Invoice generated for order {} ({} bytes)", order.id, pdf.len());
        Ok(self.invoice_url(&order.id))
    }

    fn sign(&self, key: &str, expires: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{}:{}", key, expires).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a signed URL's signature and expiry. Constant-time comparison.
    /// An unconfigured secret rejects everything - an HMAC over an empty key
    /// is publicly computable.
    pub fn verify_signed(&self, key: &str, expires: i64, sig: &str) -> bool {
        if self.signing_secret.is_empty() {
            return false;
        }
        if expires < Utc::now().timestamp() {
            return false;
        }
        let expected = match hex::decode(sig) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{}:{}", key, expires).as_bytes());
        let computed = mac.finalize().into_bytes();
        computed.as_slice().ct_eq(expected.as_slice()).into()
    }

    pub fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(key)
    }
}

// ============ PDF rendering ============
// Deliberately minimal: one page of Helvetica lines is all an order invoice
// needs, and it keeps the layout engine out of this crate.

fn pdf_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)")
}

fn invoice_lines(order: &Order) -> Vec<String> {
    let mut lines = vec![
        format!("Invoice - Order {}", order.id),
        format!("Branch: {}", order.branch_id),
        String::new(),
        format!("Customer: {}", order.customer.name),
        format!("Deliver to: {}", order.customer.address),
    ];
    if let Some(recipient) = &order.customer.recipient_name {
        lines.push(format!("Recipient: {}", recipient));
    }
    lines.push(String::new());
    for item in &order.items {
        let spec = item
            .specifications
            .as_deref()
            .map(|s| format!(" ({})", s))
            .unwrap_or_default();
        lines.push(format!(
            "{} x {}{}  -  {}",
            item.quantity,
            item.name,
            spec,
            item.price * item.quantity
        ));
    }
    lines.push(String::new());
    lines.push(format!("Delivery: {}", order.delivery_price));
    lines.push(format!("Total: {}", order.total_amount));
    lines
}

/// Render a one-page PDF 1.4 document from the order.
pub fn render_pdf(order: &Order) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 12 Tf\n16 TL\n50 780 Td\n");
    for (i, line) in invoice_lines(order).iter().enumerate() {
        if i > 0 {
            content.push_str("T*\n");
        }
        content.push_str(&format!("({}) Tj\n", pdf_escape(line)));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
    ];

    let mut out: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, obj).as_bytes());
    }

    let xref_pos = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_pos
        )
        .as_bytes(),
    );

    out
}
