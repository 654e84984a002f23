use serde::{Deserialize, Serialize};

/// A purchased gift card with a stored balance.
///
/// The balance here is bookkeeping only; the monetary discount for a
/// redemption is applied at the payment layer before the webhook arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftCard {
    pub id: String,
    pub code: String,
    /// Checkout session that purchased this card (idempotency key).
    pub checkout_session_id: Option<String>,
    pub purchaser_customer_id: Option<String>,
    pub recipient_email: Option<String>,
    pub initial_balance_cents: i64,
    pub balance_cents: i64,
    pub currency: String,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Data required to issue a gift card. The balance starts at the purchased
/// amount.
#[derive(Debug, Clone)]
pub struct CreateGiftCard {
    pub code: String,
    pub checkout_session_id: Option<String>,
    pub purchaser_customer_id: Option<String>,
    pub recipient_email: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
}
