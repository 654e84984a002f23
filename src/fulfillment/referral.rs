//! Referral recording, reward issuing and the anti-abuse rules.
//!
//! The abuse rules are a pure function over the referrer's history so they
//! can be tested with synthetic data. Recording and reward issuing wrap them
//! with the database reads/writes.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{
    CreateReferral, CreateReward, Customer, Product, ProductVariant, ReferredOrderOutcome,
    HOUSE_BRAND,
};
use crate::order_number::RandomSource;

const SECONDS_PER_DAY: i64 = 86400;

/// A referrer needs at least this many referrals before the refund rules
/// apply; below it, new referrers get the benefit of the doubt.
const MIN_REFERRALS_FOR_REVIEW: usize = 3;

/// Window for the refund-recency rule.
const RECENT_REFUND_WINDOW_SECS: i64 = 30 * SECONDS_PER_DAY;

/// Refunds inside the window that trip the recency rule.
const RECENT_REFUND_LIMIT: usize = 2;

/// Rewards expire one year after they are granted.
const REWARD_VALIDITY_SECS: i64 = 365 * SECONDS_PER_DAY;

/// Administrative referral flags of a referrer.
#[derive(Debug, Clone, Default)]
pub struct ReferrerFlags {
    pub trusted: bool,
    pub suspended: bool,
    pub notes: Option<String>,
}

/// Everything the abuse rules look at. `flags` is None when the referrer
/// account does not exist (itself a suspicious condition).
#[derive(Debug, Clone, Default)]
pub struct ReferrerHistory {
    pub flags: Option<ReferrerFlags>,
    pub orders: Vec<ReferredOrderOutcome>,
}

/// Decision of the abuse rules, with a human-readable reason for the admin
/// review queue.
#[derive(Debug, Clone)]
pub struct AbuseVerdict {
    pub suspicious: bool,
    pub reason: String,
}

impl AbuseVerdict {
    fn suspicious(reason: impl Into<String>) -> Self {
        Self {
            suspicious: true,
            reason: reason.into(),
        }
    }

    fn clear(reason: impl Into<String>) -> Self {
        Self {
            suspicious: false,
            reason: reason.into(),
        }
    }
}

/// Evaluate a referrer's history against the abuse rules.
///
/// Rules are checked in order, first match wins:
/// 1. unknown referrer account
/// 2. admin `trusted` flag bypasses everything
/// 3. admin `suspended` flag always flags
/// 4. fewer than 3 referrals on record: insufficient history
/// 5. refund rate across all referred orders at 50% or above
/// 6. two or more referred orders refunded in the trailing 30 days
pub fn evaluate_referrer(history: &ReferrerHistory, now: i64) -> AbuseVerdict {
    let Some(flags) = &history.flags else {
        return AbuseVerdict::suspicious("referrer account not found");
    };

    if flags.trusted {
        return AbuseVerdict::clear("referrer is marked trusted");
    }

    if flags.suspended {
        return match flags.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(notes) => {
                AbuseVerdict::suspicious(format!("referrer is suspended: {}", notes))
            }
            None => AbuseVerdict::suspicious("referrer is suspended"),
        };
    }

    let total = history.orders.len();
    if total < MIN_REFERRALS_FOR_REVIEW {
        return AbuseVerdict::clear(format!("only {} referral(s) on record", total));
    }

    let refunded = history.orders.iter().filter(|o| o.refunded).count();
    if refunded * 2 >= total {
        return AbuseVerdict::suspicious(format!(
            "{}/{} of referred orders were refunded",
            refunded, total
        ));
    }

    let window_start = now - RECENT_REFUND_WINDOW_SECS;
    let recent = history
        .orders
        .iter()
        .filter(|o| o.refunded && o.refunded_at.is_some_and(|at| at >= window_start))
        .count();
    if recent >= RECENT_REFUND_LIMIT {
        return AbuseVerdict::suspicious(format!(
            "{} referred orders refunded in the last 30 days",
            recent
        ));
    }

    AbuseVerdict::clear("no abuse pattern")
}

/// Assemble the abuse-rule input for a referrer from the database.
pub fn load_referrer_history(conn: &Connection, referrer_id: &str) -> Result<ReferrerHistory> {
    let flags = queries::get_customer_by_id(conn, referrer_id)?.map(|c| ReferrerFlags {
        trusted: c.referral_trusted,
        suspended: c.referral_suspended,
        notes: c.referral_notes,
    });

    let orders = if flags.is_some() {
        queries::referrer_order_outcomes(conn, referrer_id)?
    } else {
        Vec::new()
    };

    Ok(ReferrerHistory { flags, orders })
}

/// Outcome of processing a referral-code use.
#[derive(Debug)]
pub enum ReferralOutcome {
    /// Referral recorded and a pending reward granted.
    Rewarded {
        referral_id: String,
        reward_id: String,
    },
    /// Referral recorded (usage counted, the referred customer's discount
    /// stands) but no reward was granted.
    RecordedWithoutReward {
        referral_id: String,
        reason: String,
    },
    /// Nothing recorded.
    Skipped { reason: String },
}

/// Record a referral-code use on a qualifying order and grant the referrer
/// a reward if eligible.
pub fn process_referral(
    conn: &Connection,
    rng: &dyn RandomSource,
    code: &str,
    referred_customer: &Customer,
    order_id: &str,
    now: i64,
) -> Result<ReferralOutcome> {
    let Some(referral_code) = queries::get_referral_code_by_code(conn, code)? else {
        return Ok(ReferralOutcome::Skipped {
            reason: format!("referral code '{}' not found", code),
        });
    };

    if !referral_code.active {
        return Ok(ReferralOutcome::Skipped {
            reason: format!("referral code '{}' is inactive", code),
        });
    }

    if referral_code.customer_id == referred_customer.id {
        return Ok(ReferralOutcome::Skipped {
            reason: "self-referral".to_string(),
        });
    }

    // One referral bonus per referred identity, ever, across all codes.
    if queries::get_referral_by_referred_email(conn, &referred_customer.email)?.is_some() {
        return Ok(ReferralOutcome::Skipped {
            reason: format!("email {} was already referred", referred_customer.email),
        });
    }

    let history = load_referrer_history(conn, &referral_code.customer_id)?;
    let verdict = evaluate_referrer(&history, now);

    // The referral itself is recorded either way: the referred customer's
    // discount was already applied at the payment layer, and usage tracking
    // must stay accurate. Only the referrer's reward is conditional.
    let referral = queries::create_referral(
        conn,
        &CreateReferral {
            referral_code_id: referral_code.id.clone(),
            referrer_id: referral_code.customer_id.clone(),
            referred_customer_id: referred_customer.id.clone(),
            referred_email: referred_customer.email.clone(),
            order_id: Some(order_id.to_string()),
        },
    )?;
    queries::increment_referral_code_usage(conn, &referral_code.id)?;

    if verdict.suspicious {
        tracing::warn!(
            "Referral reward withheld for referrer {}: {}",
            referral_code.customer_id,
            verdict.reason
        );
        return Ok(ReferralOutcome::RecordedWithoutReward {
            referral_id: referral.id,
            reason: verdict.reason,
        });
    }

    let Some((product, variant)) = pick_reward_product(conn, rng)? else {
        tracing::warn!(
            "No active product with a variant available for referral reward, referral {} stays qualified",
            referral.id
        );
        return Ok(ReferralOutcome::RecordedWithoutReward {
            referral_id: referral.id,
            reason: "no reward product available".to_string(),
        });
    };

    let reward = queries::create_reward(
        conn,
        &CreateReward {
            customer_id: referral_code.customer_id.clone(),
            referral_id: referral.id.clone(),
            product_id: product.id.clone(),
            variant_id: variant.id.clone(),
            product_name: product.name.clone(),
            variant_name: variant.name.clone(),
            expires_at: now + REWARD_VALIDITY_SECS,
        },
    )?;
    queries::set_referral_rewarded(conn, &referral.id, &reward.id)?;

    tracing::info!(
        "Referral reward granted: referrer={}, reward={}, product='{}'",
        referral_code.customer_id,
        reward.id,
        product.name
    );

    Ok(ReferralOutcome::Rewarded {
        referral_id: referral.id,
        reward_id: reward.id,
    })
}

/// Pick a reward product: a random active house-brand product, falling back
/// to any active product. Products without variants cannot be granted and
/// are skipped.
fn pick_reward_product(
    conn: &Connection,
    rng: &dyn RandomSource,
) -> Result<Option<(Product, ProductVariant)>> {
    let house = queries::list_active_products_by_brand(conn, HOUSE_BRAND)?;
    if let Some(found) = pick_from_pool(conn, rng, house)? {
        return Ok(Some(found));
    }
    let any = queries::list_active_products(conn)?;
    pick_from_pool(conn, rng, any)
}

fn pick_from_pool(
    conn: &Connection,
    rng: &dyn RandomSource,
    mut pool: Vec<Product>,
) -> Result<Option<(Product, ProductVariant)>> {
    while !pool.is_empty() {
        let idx = rng.pick_index(pool.len());
        let product = pool.swap_remove(idx);
        let mut variants = queries::list_variants_for_product(conn, &product.id)?;
        if !variants.is_empty() {
            return Ok(Some((product, variants.remove(0))));
        }
    }
    Ok(None)
}
