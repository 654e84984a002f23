use serde::{Deserialize, Serialize};

/// Share code owned by one customer, generated lazily on their first order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralCode {
    pub id: String,
    pub customer_id: String,
    pub code: String,
    pub active: bool,
    pub usage_count: i64,
    pub created_at: i64,
}

/// One successful use of a referral code by a new customer.
///
/// The referred email is unique across all referrals: a given identity can
/// be referred at most once, ever, regardless of which code was used.
/// Referrals are created once per qualifying order and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: String,
    pub referral_code_id: String,
    pub referrer_id: String,
    pub referred_customer_id: String,
    pub referred_email: String,
    pub status: ReferralStatus,
    /// The qualifying order that triggered referral processing.
    pub order_id: Option<String>,
    pub reward_id: Option<String>,
    pub created_at: i64,
}

/// Referral lifecycle.
///
/// `Qualified` means the referral is on record (usage counted, the referred
/// customer's discount stands) but no reward was granted, either not yet or
/// withheld pending admin review. `Rewarded` links to the granted reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Qualified,
    Rewarded,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qualified => "qualified",
            Self::Rewarded => "rewarded",
        }
    }
}

impl std::str::FromStr for ReferralStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qualified" => Ok(Self::Qualified),
            "rewarded" => Ok(Self::Rewarded),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data required to record a referral. Status always starts at `qualified`.
#[derive(Debug, Clone)]
pub struct CreateReferral {
    pub referral_code_id: String,
    pub referrer_id: String,
    pub referred_customer_id: String,
    pub referred_email: String,
    pub order_id: Option<String>,
}

/// Refund outcome of one referred (qualifying) order, as consumed by the
/// abuse detector.
#[derive(Debug, Clone, Copy)]
pub struct ReferredOrderOutcome {
    pub refunded: bool,
    pub refunded_at: Option<i64>,
}

/// A free-product grant earned by a referrer.
///
/// Product and variant names are snapshots; the grant stays redeemable as
/// described even if the catalog entry changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralReward {
    pub id: String,
    pub customer_id: String,
    pub referral_id: String,
    pub product_id: String,
    pub variant_id: String,
    pub product_name: String,
    pub variant_name: String,
    pub status: RewardStatus,
    /// Order in which the referrer redeemed the reward.
    pub claimed_order_id: Option<String>,
    pub expires_at: i64,
    pub created_at: i64,
}

/// Data required to grant a reward. Status always starts at `pending`.
#[derive(Debug, Clone)]
pub struct CreateReward {
    pub customer_id: String,
    pub referral_id: String,
    pub product_id: String,
    pub variant_id: String,
    pub product_name: String,
    pub variant_name: String,
    pub expires_at: i64,
}

/// Reward lifecycle: granted as `Pending`, flipped to `Claimed` when the
/// referrer redeems it in a later order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardStatus {
    Pending,
    Claimed,
}

impl RewardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
        }
    }
}

impl std::str::FromStr for RewardStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "claimed" => Ok(Self::Claimed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for RewardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
