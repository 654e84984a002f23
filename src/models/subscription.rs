use serde::{Deserialize, Serialize};

/// Recurring coffee/tea delivery, mirrored from the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub customer_id: String,
    pub stripe_subscription_id: String,
    pub product_id: String,
    pub variant_id: String,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i64,
    /// Delivery cadence in weeks.
    pub interval_weeks: i64,
    pub status: SubscriptionStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Data required to mirror a new subscription. Status starts at `active`.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub customer_id: String,
    pub stripe_subscription_id: String,
    pub product_id: String,
    pub variant_id: String,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i64,
    pub interval_weeks: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
