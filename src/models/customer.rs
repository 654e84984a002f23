use serde::{Deserialize, Serialize};

/// A shop customer, keyed by email (stored lowercased).
///
/// Customers are created implicitly by the first completed checkout and are
/// never deleted by the fulfillment subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    /// Payment-provider customer reference (cus_xxx).
    pub stripe_customer_id: Option<String>,
    /// Admin flag: referrals by this customer bypass all abuse rules.
    pub referral_trusted: bool,
    /// Admin flag: referrals by this customer never earn rewards.
    pub referral_suspended: bool,
    /// Free-text admin notes, included in suspension verdicts.
    pub referral_notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Contact details extracted from a checkout event, used for customer upsert.
///
/// Optional fields only patch the stored customer when they carry a value;
/// a known value is never overwritten with an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerContact {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub stripe_customer_id: Option<String>,
}
