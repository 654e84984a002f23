use serde::{Deserialize, Serialize};

/// Durable record of a completed payment.
///
/// Contact and shipping fields are snapshots captured at checkout time, not
/// live references; catalog or account changes never rewrite an order.
/// All monetary fields are integer minor-currency units (cents).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Human-readable number, `ML<YYMMDD>-<4 base36>`.
    pub order_number: String,
    pub customer_id: String,
    pub email: String,
    pub phone: Option<String>,

    // Shipping snapshot (empty strings when the provider had no address)
    pub shipping_name: String,
    pub shipping_street: String,
    pub shipping_postal_code: String,
    pub shipping_city: String,
    pub shipping_country: String,

    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub currency: String,

    pub payment_status: PaymentStatus,
    pub status: OrderStatus,

    /// Checkout-session id, the idempotency key for order creation.
    pub checkout_session_id: String,
    /// Payment-intent id, the idempotency key for refund reconciliation.
    pub payment_intent_id: Option<String>,

    pub invoice_id: Option<String>,
    pub invoice_number: Option<String>,
    pub credit_note_id: Option<String>,
    pub credit_note_number: Option<String>,

    pub refunded_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Data required to insert a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub order_number: String,
    pub customer_id: String,
    pub email: String,
    pub phone: Option<String>,
    pub shipping_name: String,
    pub shipping_street: String,
    pub shipping_postal_code: String,
    pub shipping_city: String,
    pub shipping_country: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Paid,
    Shipped,
    Delivered,
    Refunded,
    PaymentFailed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Refunded => "refunded",
            Self::PaymentFailed => "payment_failed",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "refunded" => Ok(Self::Refunded),
            "payment_failed" => Ok(Self::PaymentFailed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment status as reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(Self::Paid),
            "refunded" => Ok(Self::Refunded),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Line-item snapshot owned by exactly one order.
///
/// Product and variant names are captured at checkout so the order history
/// stays accurate when the catalog changes. Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub variant_id: String,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
}

/// Data required to insert an order item.
#[derive(Debug, Clone)]
pub struct CreateOrderItem {
    pub product_id: String,
    pub variant_id: String,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
}
