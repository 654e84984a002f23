//! Transactional email via the Resend API.
//!
//! Every send in the fulfillment flow is best-effort: failures are logged by
//! the caller and never fail the order. When no API key is configured the
//! mailer degrades to logging only, which keeps local development quiet.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::invoice::cents_to_decimal;
use crate::models::{Order, OrderItem};

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Result of attempting to send an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSendResult {
    /// Email was sent successfully via Resend
    Sent,
    /// No API key configured, nothing sent
    NoApiKey,
}

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub attachment: Option<EmailAttachment>,
}

/// Email delivery seam, injected into the fulfillment pipeline.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<EmailSendResult>;
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachments: Option<Vec<ResendAttachment>>,
}

#[derive(Debug, Serialize)]
struct ResendAttachment {
    filename: String,
    /// Base64-encoded file content, per the Resend API.
    content: String,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

#[derive(Debug, Clone)]
pub struct ResendMailer {
    api_key: Option<String>,
    from_email: String,
    http_client: Client,
}

impl ResendMailer {
    pub fn new(api_key: Option<String>, from_email: String) -> Self {
        Self {
            api_key,
            from_email,
            http_client: Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<EmailSendResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(
                to = %email.to,
                subject = %email.subject,
                "No Resend API key configured, skipping email"
            );
            return Ok(EmailSendResult::NoApiKey);
        };

        let attachments = email.attachment.as_ref().map(|a| {
            vec![ResendAttachment {
                filename: a.filename.clone(),
                content: base64::engine::general_purpose::STANDARD.encode(&a.content),
            }]
        });

        let request = ResendEmailRequest {
            from: &self.from_email,
            to: vec![&email.to],
            subject: &email.subject,
            text: &email.text,
            attachments,
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
                    let _parsed: ResendEmailResponse = resp.json().await.map_err(|e| {
                        AppError::Internal(format!("Failed to parse Resend response: {}", e))
                    })?;
                    return Ok(EmailSendResult::Sent);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    // Client errors won't improve on retry
                    if status.is_client_error() {
                        return Err(AppError::Internal(format!(
                            "Resend rejected email ({}): {}",
                            status, body
                        )));
                    }
                    tracing::warn!(
                        "Resend send failed (attempt {}): {} {}",
                        attempt + 1,
                        status,
                        body
                    );
                    last_error = Some(AppError::Internal(format!(
                        "Resend error {}: {}",
                        status, body
                    )));
                }
                Err(e) => {
                    tracing::warn!("Resend send failed (attempt {}): {}", attempt + 1, e);
                    last_error = Some(AppError::Internal(format!("Resend error: {}", e)));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Internal("Resend send failed".into())))
    }
}

// ============ Templates ============

fn format_amount(cents: i64, currency: &str) -> String {
    format!("{} {}", cents_to_decimal(cents), currency.to_uppercase())
}

fn item_lines(items: &[OrderItem]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "  {}x {} ({})",
                item.quantity, item.product_name, item.variant_name
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Customer-facing order confirmation, optionally with the invoice PDF.
pub fn order_confirmation_email(
    order: &Order,
    items: &[OrderItem],
    invoice_pdf: Option<(String, Vec<u8>)>,
) -> OutgoingEmail {
    let greeting = if order.shipping_name.trim().is_empty() {
        "Hallo".to_string()
    } else {
        format!("Hallo {}", order.shipping_name.trim())
    };

    let text = format!(
        "{},\n\n\
         vielen Dank fuer deine Bestellung {}!\n\n\
         {}\n\n\
         Zwischensumme: {}\n\
         Versand: {}\n\
         Gesamt: {}\n\n\
         Wir melden uns, sobald deine Bestellung unterwegs ist.\n\n\
         Dein Mokkalab-Team",
        greeting,
        order.order_number,
        item_lines(items),
        format_amount(order.subtotal_cents, &order.currency),
        format_amount(order.shipping_cents, &order.currency),
        format_amount(order.total_cents, &order.currency),
    );

    OutgoingEmail {
        to: order.email.clone(),
        subject: format!("Deine Mokkalab-Bestellung {}", order.order_number),
        text,
        attachment: invoice_pdf.map(|(number, content)| EmailAttachment {
            filename: format!("{}.pdf", number),
            content,
        }),
    }
}

/// Internal heads-up for the operations inbox.
pub fn internal_order_notification(to: &str, order: &Order, items: &[OrderItem]) -> OutgoingEmail {
    let text = format!(
        "Neue Bestellung {}\n\n\
         Kunde: {}\n\
         Positionen:\n{}\n\n\
         Gesamt: {}",
        order.order_number,
        order.email,
        item_lines(items),
        format_amount(order.total_cents, &order.currency),
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Neue Bestellung {}", order.order_number),
        text,
        attachment: None,
    }
}

/// Gift-card delivery mail, sent to the recipient when one was named,
/// otherwise to the purchaser.
pub fn gift_card_email(to: &str, code: &str, amount_cents: i64, currency: &str) -> OutgoingEmail {
    let text = format!(
        "Hallo,\n\n\
         du hast einen Mokkalab-Gutschein ueber {} erhalten.\n\n\
         Dein Gutscheincode: {}\n\n\
         Loese ihn beim Checkout ein. Viel Freude!\n\n\
         Dein Mokkalab-Team",
        format_amount(amount_cents, currency),
        code,
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: "Dein Mokkalab-Gutschein".to_string(),
        text,
        attachment: None,
    }
}
