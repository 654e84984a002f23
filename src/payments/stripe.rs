use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(),
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        // Stripe signature format: t=timestamp,v1=signature
        let parts: Vec<&str> = signature.split(',').collect();

        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in parts {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str = timestamp
            .ok_or_else(|| AppError::BadRequest("Invalid signature format".into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::BadRequest("Invalid signature format".into()))?;

        // Parse and validate timestamp to prevent replay attacks.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::BadRequest("Invalid timestamp in signature".into()))?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Also reject timestamps from the future (clock skew tolerance: 60 seconds)
        if age < -60 {
            tracing::warn!(
                "Stripe webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison to prevent timing attacks. The length
        // check is not constant-time, but signature length is not secret
        // (always 64 hex chars for SHA-256).
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }

    /// Fetch the line items of a checkout session.
    ///
    /// The webhook payload deliberately omits line items; they have to be
    /// expanded with a follow-up API call. `data.price.product` is expanded
    /// so the catalog references riding in the Stripe product metadata come
    /// back in the same response.
    pub async fn fetch_checkout_line_items(&self, session_id: &str) -> Result<Vec<StripeLineItem>> {
        let url = format!(
            "{}/checkout/sessions/{}/line_items?limit=100&expand[]=data.price.product",
            STRIPE_API_BASE, session_id
        );
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Stripe API error: {}",
                error_text
            )));
        }

        let list: StripeLineItemList = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(list.data)
    }
}

// ============ Wire types ============

/// Generic Stripe webhook event - object is parsed based on event_type.
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub payment_status: String,
    pub payment_intent: Option<String>,
    /// Provider customer reference (cus_xxx).
    pub customer: Option<String>,
    pub subscription: Option<String>,
    pub customer_details: Option<StripeCustomerDetails>,
    pub shipping_details: Option<StripeShippingDetails>,
    pub amount_subtotal: Option<i64>,
    pub amount_total: Option<i64>,
    pub total_details: Option<StripeTotalDetails>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: StripeMetadata,
}

#[derive(Debug, Deserialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<StripeAddress>,
}

#[derive(Debug, Deserialize)]
pub struct StripeShippingDetails {
    pub name: Option<String>,
    pub address: Option<StripeAddress>,
}

#[derive(Debug, Deserialize)]
pub struct StripeAddress {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeTotalDetails {
    pub amount_discount: Option<i64>,
    pub amount_shipping: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripeLineItemList {
    data: Vec<StripeLineItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeLineItem {
    pub quantity: Option<i64>,
    pub amount_total: Option<i64>,
    pub description: Option<String>,
    pub price: Option<StripePrice>,
}

#[derive(Debug, Deserialize)]
pub struct StripePrice {
    pub unit_amount: Option<i64>,
    /// Expanded product object (expand[]=data.price.product).
    pub product: Option<StripeProduct>,
}

#[derive(Debug, Deserialize)]
pub struct StripeProduct {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: StripeProductMetadata,
}

/// Catalog references attached to the Stripe product at sync time.
#[derive(Debug, Default, Deserialize)]
pub struct StripeProductMetadata {
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub variant_name: Option<String>,
}

/// `charge.refunded` event object. Only the payment-intent linkage matters
/// for reconciliation.
#[derive(Debug, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub refunded: bool,
    pub amount_refunded: Option<i64>,
}

// ============ Checkout metadata ============

/// Raw string-keyed metadata as Stripe delivers it. Parsed exactly once at
/// the webhook boundary into [`CheckoutKind`]; nothing downstream touches
/// these loosely-typed fields again.
#[derive(Debug, Default, Deserialize)]
pub struct StripeMetadata {
    pub purchase_type: Option<String>,
    pub referral_code: Option<String>,
    pub gift_card_id: Option<String>,
    pub gift_card_amount: Option<String>,
    pub claimed_reward_ids: Option<String>,
    pub gift_card_recipient: Option<String>,
    pub subscription_interval_weeks: Option<String>,
}

/// What a completed checkout session purchased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutKind {
    StandardOrder(StandardOrderMeta),
    GiftCardPurchase(GiftCardPurchaseMeta),
    SubscriptionPurchase(SubscriptionPurchaseMeta),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandardOrderMeta {
    pub referral_code: Option<String>,
    pub gift_card: Option<GiftCardRedemption>,
    pub claimed_reward_ids: Vec<String>,
}

/// Gift card applied to the order at the payment layer; the id and amount
/// are carried through for balance bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiftCardRedemption {
    pub gift_card_id: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GiftCardPurchaseMeta {
    pub recipient_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionPurchaseMeta {
    pub interval_weeks: i64,
}

const DEFAULT_SUBSCRIPTION_INTERVAL_WEEKS: i64 = 4;

impl StripeMetadata {
    /// Classify the session by its purchase-type discriminator.
    ///
    /// Unknown discriminators fall back to a standard order rather than
    /// failing the event; the metadata is advisory, the payment is real.
    pub fn parse_kind(&self) -> CheckoutKind {
        match self.purchase_type.as_deref() {
            Some("gift_card") => CheckoutKind::GiftCardPurchase(GiftCardPurchaseMeta {
                recipient_email: non_empty(&self.gift_card_recipient),
            }),
            Some("subscription") => CheckoutKind::SubscriptionPurchase(SubscriptionPurchaseMeta {
                interval_weeks: self
                    .subscription_interval_weeks
                    .as_deref()
                    .and_then(|v| v.parse().ok())
                    .filter(|w| *w > 0)
                    .unwrap_or(DEFAULT_SUBSCRIPTION_INTERVAL_WEEKS),
            }),
            other => {
                if let Some(unknown) = other.filter(|t| !t.is_empty()) {
                    tracing::warn!(
                        "Unknown purchase_type '{}' in checkout metadata, treating as standard order",
                        unknown
                    );
                }
                CheckoutKind::StandardOrder(StandardOrderMeta {
                    referral_code: non_empty(&self.referral_code),
                    gift_card: self.parse_gift_card_redemption(),
                    claimed_reward_ids: self
                        .claimed_reward_ids
                        .as_deref()
                        .map(|ids| {
                            ids.split(',')
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(String::from)
                                .collect()
                        })
                        .unwrap_or_default(),
                })
            }
        }
    }

    fn parse_gift_card_redemption(&self) -> Option<GiftCardRedemption> {
        let gift_card_id = non_empty(&self.gift_card_id)?;
        let raw_amount = self.gift_card_amount.as_deref()?;
        match raw_amount.parse::<i64>() {
            Ok(amount_cents) if amount_cents > 0 => Some(GiftCardRedemption {
                gift_card_id,
                amount_cents,
            }),
            _ => {
                tracing::warn!(
                    "Unparseable gift_card_amount '{}' for gift card {}, skipping balance bookkeeping",
                    raw_amount,
                    gift_card_id
                );
                None
            }
        }
    }
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
