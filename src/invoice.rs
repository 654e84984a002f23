//! Invoice and credit-note generation.
//!
//! Documents are produced by an external provider (Lexoffice); this module
//! derives document numbers from the order number, builds the document
//! request from the order snapshot, and persists the returned document id so
//! each order gets at most one invoice and at most one credit note.

use async_trait::async_trait;
use reqwest::Client;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::json;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{Order, OrderItem, OrderStatus};

const LEXOFFICE_API_BASE: &str = "https://api.lexoffice.io/v1";

const INVOICE_PREFIX: &str = "RE-";
const CREDIT_NOTE_PREFIX: &str = "GS-";

/// Fixed seller identity printed on every document.
#[derive(Debug, Clone, Copy)]
pub struct SellerIdentity {
    pub name: &'static str,
    pub street: &'static str,
    pub postal_code: &'static str,
    pub city: &'static str,
    pub country: &'static str,
    pub vat_id: &'static str,
}

pub const SELLER: SellerIdentity = SellerIdentity {
    name: "Mokkalab GmbH",
    street: "Roesterei 12",
    postal_code: "50667",
    city: "Koeln",
    country: "DE",
    vat_id: "DE312604778",
};

/// Derive the invoice number from an order number: the `ML` brand prefix is
/// replaced by `RE-`, e.g. `ML250614-K8Z0` -> `RE-250614-K8Z0`.
pub fn invoice_number_for(order_number: &str) -> String {
    let stripped = order_number
        .strip_prefix(crate::order_number::ORDER_NUMBER_PREFIX)
        .unwrap_or(order_number);
    format!("{}{}", INVOICE_PREFIX, stripped)
}

/// Derive the credit-note number from an invoice number,
/// e.g. `RE-250614-K8Z0` -> `GS-RE-250614-K8Z0`.
pub fn credit_note_number_for(invoice_number: &str) -> String {
    format!("{}{}", CREDIT_NOTE_PREFIX, invoice_number)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Invoice,
    CreditNote,
}

/// One monetary line of a document. Amounts are cents; credit notes carry
/// negated amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLine {
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

/// Buyer identity from the order's checkout-time snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyerAddress {
    pub name: String,
    pub street: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone)]
pub struct DocumentRequest {
    pub kind: DocumentKind,
    pub number: String,
    pub buyer: BuyerAddress,
    pub lines: Vec<DocumentLine>,
    pub currency: String,
    pub total_cents: i64,
}

/// Reference of a document created by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedDocument {
    pub id: String,
    pub number: String,
}

/// External document-generation provider.
///
/// PDF retrieval is a separate on-demand call; `create_document` must not
/// render eagerly.
#[async_trait]
pub trait InvoiceProvider: Send + Sync {
    async fn create_document(&self, request: &DocumentRequest) -> Result<CreatedDocument>;

    async fn fetch_pdf(&self, document_id: &str) -> Result<Vec<u8>>;
}

/// Buyer snapshot with placeholder fallbacks. Incomplete address data must
/// never block document generation; the provider accepts placeholders and
/// the document can be corrected manually later.
fn buyer_from_order(order: &Order) -> BuyerAddress {
    let or_placeholder = |s: &str, placeholder: &str| -> String {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            placeholder.to_string()
        } else {
            trimmed.to_string()
        }
    };

    BuyerAddress {
        name: or_placeholder(&order.shipping_name, &or_placeholder(&order.email, "Kunde")),
        street: or_placeholder(&order.shipping_street, "Nicht angegeben"),
        postal_code: or_placeholder(&order.shipping_postal_code, "00000"),
        city: or_placeholder(&order.shipping_city, "Nicht angegeben"),
        country: or_placeholder(&order.shipping_country, "DE"),
    }
}

fn item_line_name(item: &OrderItem) -> String {
    if item.variant_name.trim().is_empty() {
        item.product_name.clone()
    } else {
        format!("{} ({})", item.product_name, item.variant_name)
    }
}

/// Build the invoice request for a paid order.
///
/// The shipping line is always present, even at zero, so free shipping is
/// visible on the document. A discount shows up as a negative line.
pub fn build_invoice_request(order: &Order, items: &[OrderItem]) -> DocumentRequest {
    let mut lines: Vec<DocumentLine> = items
        .iter()
        .map(|item| DocumentLine {
            name: item_line_name(item),
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            total_cents: item.total_price_cents,
        })
        .collect();

    lines.push(DocumentLine {
        name: "Versand".to_string(),
        quantity: 1,
        unit_price_cents: order.shipping_cents,
        total_cents: order.shipping_cents,
    });

    if order.discount_cents > 0 {
        lines.push(DocumentLine {
            name: "Rabatt".to_string(),
            quantity: 1,
            unit_price_cents: -order.discount_cents,
            total_cents: -order.discount_cents,
        });
    }

    DocumentRequest {
        kind: DocumentKind::Invoice,
        number: invoice_number_for(&order.order_number),
        buyer: buyer_from_order(order),
        lines,
        currency: order.currency.clone(),
        total_cents: order.total_cents,
    }
}

/// Build the credit-note request for a refunded order.
///
/// All monetary lines are negated relative to the invoice; a discount
/// reverses as a positive line so the lines net out to the refunded total.
pub fn build_credit_note_request(order: &Order, items: &[OrderItem]) -> DocumentRequest {
    let invoice_number = order
        .invoice_number
        .clone()
        .unwrap_or_else(|| invoice_number_for(&order.order_number));

    let mut lines: Vec<DocumentLine> = items
        .iter()
        .map(|item| DocumentLine {
            name: item_line_name(item),
            quantity: item.quantity,
            unit_price_cents: -item.unit_price_cents,
            total_cents: -item.total_price_cents,
        })
        .collect();

    lines.push(DocumentLine {
        name: "Versand".to_string(),
        quantity: 1,
        unit_price_cents: -order.shipping_cents,
        total_cents: -order.shipping_cents,
    });

    if order.discount_cents > 0 {
        lines.push(DocumentLine {
            name: "Rabatt".to_string(),
            quantity: 1,
            unit_price_cents: order.discount_cents,
            total_cents: order.discount_cents,
        });
    }

    DocumentRequest {
        kind: DocumentKind::CreditNote,
        number: credit_note_number_for(&invoice_number),
        buyer: buyer_from_order(order),
        lines,
        currency: order.currency.clone(),
        total_cents: -order.total_cents,
    }
}

/// Create the invoice for an order, at most once.
///
/// A stored document id short-circuits without calling the provider, so
/// redeliveries and manual re-runs are free.
pub async fn ensure_invoice(
    conn: &mut Connection,
    provider: &dyn InvoiceProvider,
    order: &Order,
) -> Result<CreatedDocument> {
    if let (Some(id), Some(number)) = (&order.invoice_id, &order.invoice_number) {
        return Ok(CreatedDocument {
            id: id.clone(),
            number: number.clone(),
        });
    }

    let items = queries::list_order_items(conn, &order.id)?;
    let request = build_invoice_request(order, &items);
    let document = provider.create_document(&request).await?;

    queries::set_order_invoice(conn, &order.id, &document.id, &document.number)?;

    tracing::info!(
        "Invoice {} created for order {} (document {})",
        document.number,
        order.order_number,
        document.id
    );

    Ok(document)
}

/// Create the credit note for a refunded order, at most once.
pub async fn ensure_credit_note(
    conn: &mut Connection,
    provider: &dyn InvoiceProvider,
    order: &Order,
) -> Result<CreatedDocument> {
    if order.status != OrderStatus::Refunded {
        return Err(AppError::BadRequest(format!(
            "credit note requires a refunded order, got status '{}'",
            order.status
        )));
    }

    if let (Some(id), Some(number)) = (&order.credit_note_id, &order.credit_note_number) {
        return Ok(CreatedDocument {
            id: id.clone(),
            number: number.clone(),
        });
    }

    let items = queries::list_order_items(conn, &order.id)?;
    let request = build_credit_note_request(order, &items);
    let document = provider.create_document(&request).await?;

    queries::set_order_credit_note(conn, &order.id, &document.id, &document.number)?;

    tracing::info!(
        "Credit note {} created for order {} (document {})",
        document.number,
        order.order_number,
        document.id
    );

    Ok(document)
}

// ============ Lexoffice client ============

/// Render cents as a decimal amount string without going through floats,
/// e.g. 1999 -> "19.99", -500 -> "-5.00".
pub(crate) fn cents_to_decimal(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[derive(Debug, Deserialize)]
struct LexofficeCreateResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LexofficeRenderResponse {
    #[serde(rename = "documentFileId")]
    document_file_id: String,
}

#[derive(Debug, Clone)]
pub struct LexofficeClient {
    client: Client,
    api_key: String,
}

impl LexofficeClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl InvoiceProvider for LexofficeClient {
    async fn create_document(&self, request: &DocumentRequest) -> Result<CreatedDocument> {
        let voucher_type = match request.kind {
            DocumentKind::Invoice => "invoice",
            DocumentKind::CreditNote => "creditnote",
        };

        let line_items: Vec<serde_json::Value> = request
            .lines
            .iter()
            .map(|line| {
                json!({
                    "type": "custom",
                    "name": line.name,
                    "quantity": line.quantity,
                    "unitPrice": {
                        "currency": request.currency.to_uppercase(),
                        "netAmount": cents_to_decimal(line.unit_price_cents),
                        "taxRatePercentage": 19,
                    },
                })
            })
            .collect();

        let body = json!({
            "voucherNumber": request.number,
            "address": {
                "name": request.buyer.name,
                "street": request.buyer.street,
                "zip": request.buyer.postal_code,
                "city": request.buyer.city,
                "countryCode": request.buyer.country,
            },
            "lineItems": line_items,
            "totalPrice": {
                "currency": request.currency.to_uppercase(),
                "totalGrossAmount": cents_to_decimal(request.total_cents),
            },
            "remark": format!("{} / {}", SELLER.name, SELLER.vat_id),
            "taxConditions": { "taxType": "gross" },
        });

        let url = format!("{}/{}s?finalize=true", LEXOFFICE_API_BASE, voucher_type);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Lexoffice API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Lexoffice API error: {}",
                error_text
            )));
        }

        let created: LexofficeCreateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse Lexoffice response: {}", e)))?;

        Ok(CreatedDocument {
            id: created.id,
            number: request.number.clone(),
        })
    }

    async fn fetch_pdf(&self, document_id: &str) -> Result<Vec<u8>> {
        // Rendering is a two-step call: resolve the file id, then download.
        let render_url = format!("{}/invoices/{}/document", LEXOFFICE_API_BASE, document_id);
        let response = self
            .client
            .get(&render_url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Lexoffice API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Lexoffice API error: {}",
                error_text
            )));
        }

        let render: LexofficeRenderResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse Lexoffice response: {}", e)))?;

        let file_url = format!("{}/files/{}", LEXOFFICE_API_BASE, render.document_file_id);
        let file_response = self
            .client
            .get(&file_url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Lexoffice API error: {}", e)))?;

        if !file_response.status().is_success() {
            return Err(AppError::Internal("Lexoffice file download failed".into()));
        }

        let bytes = file_response
            .bytes()
            .await
            .map_err(|e| AppError::Internal(format!("Lexoffice file download failed: {}", e)))?;

        Ok(bytes.to_vec())
    }
}
