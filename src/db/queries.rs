use chrono::Utc;
use rusqlite::{params, types::Value, Connection};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;
use crate::order_number::RandomSource;

use super::from_row::{
    query_all, query_one, CUSTOMER_COLS, GIFT_CARD_COLS, ORDER_COLS, ORDER_ITEM_COLS,
    PRODUCT_COLS, REFERRAL_CODE_COLS, REFERRAL_COLS, REWARD_COLS, SUBSCRIPTION_COLS, VARIANT_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Whether an error is a SQLite UNIQUE constraint violation.
///
/// Checked via the extended result code, not the error message text, so the
/// caller can reclassify duplicate-key races without string matching.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Builder for dynamic UPDATE statements with optional fields.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    fn execute(mut self, conn: &Connection) -> Result<bool> {
        if self.fields.is_empty() {
            return Ok(false);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, sets.join(", "));
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(affected > 0)
    }
}

// ============ Customers ============

pub fn get_customer_by_id(conn: &Connection, id: &str) -> Result<Option<Customer>> {
    query_one(
        conn,
        &format!("SELECT {} FROM customers WHERE id = ?1", CUSTOMER_COLS),
        &[&id],
    )
}

pub fn get_customer_by_email(conn: &Connection, email: &str) -> Result<Option<Customer>> {
    let email = email.trim().to_lowercase();
    query_one(
        conn,
        &format!("SELECT {} FROM customers WHERE email = ?1", CUSTOMER_COLS),
        &[&email],
    )
}

/// Create the customer on first contact, or patch newly-known fields.
///
/// A stored value is never overwritten by a missing or empty incoming one;
/// a present value always wins over the stored one (people fix typos in
/// later checkouts).
pub fn upsert_customer(conn: &Connection, contact: &CustomerContact) -> Result<Customer> {
    let email = contact.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::BadRequest("customer email is empty".into()));
    }

    let non_empty = |v: &Option<String>| -> Option<String> {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    if let Some(existing) = get_customer_by_email(conn, &email)? {
        UpdateBuilder::new("customers", &existing.id)
            .with_updated_at()
            .set_opt("first_name", non_empty(&contact.first_name))
            .set_opt("last_name", non_empty(&contact.last_name))
            .set_opt("phone", non_empty(&contact.phone))
            .set_opt("stripe_customer_id", non_empty(&contact.stripe_customer_id))
            .execute(conn)?;

        return Ok(get_customer_by_id(conn, &existing.id)?.unwrap_or(existing));
    }

    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO customers (id, email, first_name, last_name, phone, stripe_customer_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            &email,
            non_empty(&contact.first_name),
            non_empty(&contact.last_name),
            non_empty(&contact.phone),
            non_empty(&contact.stripe_customer_id),
            now,
            now
        ],
    )?;

    get_customer_by_id(conn, &id)?
        .ok_or_else(|| AppError::Internal("customer vanished after insert".into()))
}

/// Admin switch for the referral program flags.
pub fn set_customer_referral_flags(
    conn: &Connection,
    customer_id: &str,
    trusted: bool,
    suspended: bool,
    notes: Option<&str>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE customers SET referral_trusted = ?1, referral_suspended = ?2, referral_notes = ?3, updated_at = ?4
         WHERE id = ?5",
        params![trusted as i32, suspended as i32, notes, now(), customer_id],
    )?;
    Ok(affected > 0)
}

// ============ Catalog ============

pub fn create_product(conn: &Connection, input: &CreateProduct) -> Result<Product> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO products (id, name, brand, active, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, &input.name, &input.brand, input.active as i32, now],
    )?;
    Ok(Product {
        id,
        name: input.name.clone(),
        brand: input.brand.clone(),
        active: input.active,
        created_at: now,
    })
}

pub fn create_product_variant(
    conn: &Connection,
    product_id: &str,
    input: &CreateProductVariant,
) -> Result<ProductVariant> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO product_variants (id, product_id, name, price_cents, stock, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, product_id, &input.name, input.price_cents, input.stock, now],
    )?;
    Ok(ProductVariant {
        id,
        product_id: product_id.to_string(),
        name: input.name.clone(),
        price_cents: input.price_cents,
        stock: input.stock,
        created_at: now,
    })
}

pub fn get_variant_by_id(conn: &Connection, id: &str) -> Result<Option<ProductVariant>> {
    query_one(
        conn,
        &format!("SELECT {} FROM product_variants WHERE id = ?1", VARIANT_COLS),
        &[&id],
    )
}

pub fn list_active_products_by_brand(conn: &Connection, brand: &str) -> Result<Vec<Product>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM products WHERE brand = ?1 AND active = 1 ORDER BY created_at",
            PRODUCT_COLS
        ),
        &[&brand],
    )
}

pub fn list_active_products(conn: &Connection) -> Result<Vec<Product>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM products WHERE active = 1 ORDER BY created_at",
            PRODUCT_COLS
        ),
        &[],
    )
}

pub fn list_variants_for_product(conn: &Connection, product_id: &str) -> Result<Vec<ProductVariant>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM product_variants WHERE product_id = ?1 ORDER BY created_at",
            VARIANT_COLS
        ),
        &[&product_id],
    )
}

// ============ Stock ============

/// Deduct stock for one variant. Returns false when the variant is unknown
/// or has insufficient stock; the row is left untouched in that case.
pub fn deduct_variant_stock(conn: &Connection, variant_id: &str, quantity: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE product_variants SET stock = stock - ?1 WHERE id = ?2 AND stock >= ?1",
        params![quantity, variant_id],
    )?;
    Ok(affected > 0)
}

/// Restore stock for one variant. Returns false when the variant is unknown.
pub fn restore_variant_stock(conn: &Connection, variant_id: &str, quantity: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE product_variants SET stock = stock + ?1 WHERE id = ?2",
        params![quantity, variant_id],
    )?;
    Ok(affected > 0)
}

// ============ Orders ============

/// Outcome of an order insert attempt.
///
/// `Conflict` means a UNIQUE constraint rejected the row: either a duplicate
/// checkout session (benign redelivery race) or a colliding order number.
/// The caller disambiguates by re-reading by session id.
pub enum OrderInsert {
    Created(Order),
    Conflict,
}

pub fn insert_order(conn: &Connection, input: &CreateOrder) -> Result<OrderInsert> {
    let id = gen_id();
    let now = now();
    let result = conn.execute(
        "INSERT INTO orders (id, order_number, customer_id, email, phone,
            shipping_name, shipping_street, shipping_postal_code, shipping_city, shipping_country,
            subtotal_cents, discount_cents, shipping_cents, total_cents, currency,
            payment_status, status, checkout_session_id, payment_intent_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
        params![
            &id,
            &input.order_number,
            &input.customer_id,
            &input.email,
            &input.phone,
            &input.shipping_name,
            &input.shipping_street,
            &input.shipping_postal_code,
            &input.shipping_city,
            &input.shipping_country,
            input.subtotal_cents,
            input.discount_cents,
            input.shipping_cents,
            input.total_cents,
            &input.currency,
            PaymentStatus::Paid.as_str(),
            OrderStatus::Paid.as_str(),
            &input.checkout_session_id,
            &input.payment_intent_id,
            now,
            now
        ],
    );

    match result {
        Ok(_) => {
            let order = get_order_by_id(conn, &id)?
                .ok_or_else(|| AppError::Internal("order vanished after insert".into()))?;
            Ok(OrderInsert::Created(order))
        }
        Err(e) if is_unique_violation(&e) => Ok(OrderInsert::Conflict),
        Err(e) => Err(e.into()),
    }
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

pub fn get_order_by_checkout_session(conn: &Connection, session_id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE checkout_session_id = ?1",
            ORDER_COLS
        ),
        &[&session_id],
    )
}

pub fn get_order_by_payment_intent(
    conn: &Connection,
    payment_intent_id: &str,
) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE payment_intent_id = ?1",
            ORDER_COLS
        ),
        &[&payment_intent_id],
    )
}

pub fn insert_order_item(
    conn: &Connection,
    order_id: &str,
    input: &CreateOrderItem,
) -> Result<OrderItem> {
    let id = gen_id();
    conn.execute(
        "INSERT INTO order_items (id, order_id, product_id, variant_id, product_name, variant_name, quantity, unit_price_cents, total_price_cents)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &id,
            order_id,
            &input.product_id,
            &input.variant_id,
            &input.product_name,
            &input.variant_name,
            input.quantity,
            input.unit_price_cents,
            input.total_price_cents
        ],
    )?;
    Ok(OrderItem {
        id,
        order_id: order_id.to_string(),
        product_id: input.product_id.clone(),
        variant_id: input.variant_id.clone(),
        product_name: input.product_name.clone(),
        variant_name: input.variant_name.clone(),
        quantity: input.quantity,
        unit_price_cents: input.unit_price_cents,
        total_price_cents: input.total_price_cents,
    })
}

pub fn list_order_items(conn: &Connection, order_id: &str) -> Result<Vec<OrderItem>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY rowid",
            ORDER_ITEM_COLS
        ),
        &[&order_id],
    )
}

/// Store the invoice reference once the external provider returned it.
pub fn set_order_invoice(
    conn: &Connection,
    order_id: &str,
    invoice_id: &str,
    invoice_number: &str,
) -> Result<bool> {
    UpdateBuilder::new("orders", order_id)
        .with_updated_at()
        .set("invoice_id", invoice_id.to_string())
        .set("invoice_number", invoice_number.to_string())
        .execute(conn)
}

pub fn set_order_credit_note(
    conn: &Connection,
    order_id: &str,
    credit_note_id: &str,
    credit_note_number: &str,
) -> Result<bool> {
    UpdateBuilder::new("orders", order_id)
        .with_updated_at()
        .set("credit_note_id", credit_note_id.to_string())
        .set("credit_note_number", credit_note_number.to_string())
        .execute(conn)
}

pub fn mark_order_refunded(conn: &Connection, order_id: &str, refunded_at: i64) -> Result<bool> {
    UpdateBuilder::new("orders", order_id)
        .with_updated_at()
        .set("status", OrderStatus::Refunded.as_str().to_string())
        .set("payment_status", PaymentStatus::Refunded.as_str().to_string())
        .set("refunded_at", refunded_at)
        .execute(conn)
}

// ============ Referral codes ============

pub fn get_referral_code_by_customer(
    conn: &Connection,
    customer_id: &str,
) -> Result<Option<ReferralCode>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM referral_codes WHERE customer_id = ?1",
            REFERRAL_CODE_COLS
        ),
        &[&customer_id],
    )
}

pub fn get_referral_code_by_code(conn: &Connection, code: &str) -> Result<Option<ReferralCode>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM referral_codes WHERE code = ?1",
            REFERRAL_CODE_COLS
        ),
        &[&code],
    )
}

fn create_referral_code(
    conn: &Connection,
    customer_id: &str,
    code: &str,
) -> std::result::Result<ReferralCode, rusqlite::Error> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO referral_codes (id, customer_id, code, active, usage_count, created_at)
         VALUES (?1, ?2, ?3, 1, 0, ?4)",
        params![&id, customer_id, code, now],
    )?;
    Ok(ReferralCode {
        id,
        customer_id: customer_id.to_string(),
        code: code.to_string(),
        active: true,
        usage_count: 0,
        created_at: now,
    })
}

/// Return the customer's referral code, generating one if missing.
///
/// Candidate codes are checked for uniqueness before insert; the UNIQUE
/// constraint still backstops the lost race, in which case the loop retries
/// (code collision) or re-reads (another delivery created the customer's
/// code first).
pub fn ensure_referral_code(
    conn: &Connection,
    customer_id: &str,
    rng: &dyn RandomSource,
) -> Result<ReferralCode> {
    if let Some(code) = get_referral_code_by_customer(conn, customer_id)? {
        return Ok(code);
    }

    for _ in 0..5 {
        let candidate = format!("ML-{}", rng.base36(6));
        if get_referral_code_by_code(conn, &candidate)?.is_some() {
            continue;
        }
        match create_referral_code(conn, customer_id, &candidate) {
            Ok(code) => return Ok(code),
            Err(e) if is_unique_violation(&e) => {
                if let Some(code) = get_referral_code_by_customer(conn, customer_id)? {
                    return Ok(code);
                }
                // code string collided with a concurrent insert; try another
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal(
        "could not generate a unique referral code".into(),
    ))
}

pub fn increment_referral_code_usage(conn: &Connection, code_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE referral_codes SET usage_count = usage_count + 1 WHERE id = ?1",
        params![code_id],
    )?;
    Ok(affected > 0)
}

// ============ Referrals ============

pub fn get_referral_by_id(conn: &Connection, id: &str) -> Result<Option<Referral>> {
    query_one(
        conn,
        &format!("SELECT {} FROM referrals WHERE id = ?1", REFERRAL_COLS),
        &[&id],
    )
}

pub fn get_referral_by_referred_email(conn: &Connection, email: &str) -> Result<Option<Referral>> {
    let email = email.trim().to_lowercase();
    query_one(
        conn,
        &format!(
            "SELECT {} FROM referrals WHERE referred_email = ?1",
            REFERRAL_COLS
        ),
        &[&email],
    )
}

pub fn create_referral(conn: &Connection, input: &CreateReferral) -> Result<Referral> {
    let id = gen_id();
    let now = now();
    let email = input.referred_email.trim().to_lowercase();
    conn.execute(
        "INSERT INTO referrals (id, referral_code_id, referrer_id, referred_customer_id, referred_email, status, order_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &id,
            &input.referral_code_id,
            &input.referrer_id,
            &input.referred_customer_id,
            &email,
            ReferralStatus::Qualified.as_str(),
            &input.order_id,
            now
        ],
    )?;
    Ok(Referral {
        id,
        referral_code_id: input.referral_code_id.clone(),
        referrer_id: input.referrer_id.clone(),
        referred_customer_id: input.referred_customer_id.clone(),
        referred_email: email,
        status: ReferralStatus::Qualified,
        order_id: input.order_id.clone(),
        reward_id: None,
        created_at: now,
    })
}

pub fn set_referral_rewarded(conn: &Connection, referral_id: &str, reward_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE referrals SET status = ?1, reward_id = ?2 WHERE id = ?3",
        params![ReferralStatus::Rewarded.as_str(), reward_id, referral_id],
    )?;
    Ok(affected > 0)
}

/// Refund outcomes of all qualifying orders referred by this customer,
/// the abuse detector's raw history.
pub fn referrer_order_outcomes(
    conn: &Connection,
    referrer_id: &str,
) -> Result<Vec<ReferredOrderOutcome>> {
    let mut stmt = conn.prepare(
        "SELECT o.status, o.refunded_at
         FROM referrals r LEFT JOIN orders o ON r.order_id = o.id
         WHERE r.referrer_id = ?1",
    )?;
    let rows = stmt
        .query_map(params![referrer_id], |row| {
            let status: Option<String> = row.get(0)?;
            let refunded_at: Option<i64> = row.get(1)?;
            Ok(ReferredOrderOutcome {
                refunded: status.as_deref() == Some(OrderStatus::Refunded.as_str()),
                refunded_at,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ Referral rewards ============

pub fn create_reward(conn: &Connection, input: &CreateReward) -> Result<ReferralReward> {
    let id = gen_id();
    let now = now();
    conn.execute(
        "INSERT INTO referral_rewards (id, customer_id, referral_id, product_id, variant_id, product_name, variant_name, status, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &id,
            &input.customer_id,
            &input.referral_id,
            &input.product_id,
            &input.variant_id,
            &input.product_name,
            &input.variant_name,
            RewardStatus::Pending.as_str(),
            input.expires_at,
            now
        ],
    )?;
    Ok(ReferralReward {
        id,
        customer_id: input.customer_id.clone(),
        referral_id: input.referral_id.clone(),
        product_id: input.product_id.clone(),
        variant_id: input.variant_id.clone(),
        product_name: input.product_name.clone(),
        variant_name: input.variant_name.clone(),
        status: RewardStatus::Pending,
        claimed_order_id: None,
        expires_at: input.expires_at,
        created_at: now,
    })
}

pub fn get_reward_by_id(conn: &Connection, id: &str) -> Result<Option<ReferralReward>> {
    query_one(
        conn,
        &format!("SELECT {} FROM referral_rewards WHERE id = ?1", REWARD_COLS),
        &[&id],
    )
}

pub fn get_reward_by_referral(conn: &Connection, referral_id: &str) -> Result<Option<ReferralReward>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM referral_rewards WHERE referral_id = ?1",
            REWARD_COLS
        ),
        &[&referral_id],
    )
}

/// Mark a pending reward as claimed by an order.
/// Returns false when the reward is unknown or not pending (already claimed).
pub fn claim_reward(conn: &Connection, reward_id: &str, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE referral_rewards SET status = ?1, claimed_order_id = ?2
         WHERE id = ?3 AND status = ?4",
        params![
            RewardStatus::Claimed.as_str(),
            order_id,
            reward_id,
            RewardStatus::Pending.as_str()
        ],
    )?;
    Ok(affected > 0)
}

// ============ Gift cards ============

/// Insert a purchased gift card. Returns None when the checkout session
/// already produced one (duplicate delivery).
pub fn create_gift_card(conn: &Connection, input: &CreateGiftCard) -> Result<Option<GiftCard>> {
    let id = gen_id();
    let now = now();
    let result = conn.execute(
        "INSERT INTO gift_cards (id, code, checkout_session_id, purchaser_customer_id, recipient_email, initial_balance_cents, balance_cents, currency, active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, 1, ?8, ?8)",
        params![
            &id,
            &input.code,
            &input.checkout_session_id,
            &input.purchaser_customer_id,
            &input.recipient_email,
            input.amount_cents,
            &input.currency,
            now
        ],
    );

    match result {
        Ok(_) => Ok(get_gift_card_by_id(conn, &id)?),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_gift_card_by_id(conn: &Connection, id: &str) -> Result<Option<GiftCard>> {
    query_one(
        conn,
        &format!("SELECT {} FROM gift_cards WHERE id = ?1", GIFT_CARD_COLS),
        &[&id],
    )
}

pub fn get_gift_card_by_session(conn: &Connection, session_id: &str) -> Result<Option<GiftCard>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM gift_cards WHERE checkout_session_id = ?1",
            GIFT_CARD_COLS
        ),
        &[&session_id],
    )
}

/// Debit a gift card balance, clamping at zero.
///
/// Returns the new balance, or None when the card is unknown. The clamp is
/// correct here: the discount was already applied at the payment layer, so
/// this only keeps the stored balance from going negative.
pub fn debit_gift_card(conn: &Connection, id: &str, amount_cents: i64) -> Result<Option<i64>> {
    let Some(card) = get_gift_card_by_id(conn, id)? else {
        return Ok(None);
    };
    let new_balance = (card.balance_cents - amount_cents).max(0);
    conn.execute(
        "UPDATE gift_cards SET balance_cents = ?1, updated_at = ?2 WHERE id = ?3",
        params![new_balance, now(), id],
    )?;
    Ok(Some(new_balance))
}

// ============ Subscriptions ============

/// Insert a subscription mirror row. Returns None when the provider
/// subscription id is already on record (duplicate delivery).
pub fn create_subscription(
    conn: &Connection,
    input: &CreateSubscription,
) -> Result<Option<Subscription>> {
    let id = gen_id();
    let now = now();
    let result = conn.execute(
        "INSERT INTO subscriptions (id, customer_id, stripe_subscription_id, product_id, variant_id, product_name, variant_name, quantity, interval_weeks, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            &id,
            &input.customer_id,
            &input.stripe_subscription_id,
            &input.product_id,
            &input.variant_id,
            &input.product_name,
            &input.variant_name,
            input.quantity,
            input.interval_weeks,
            SubscriptionStatus::Active.as_str(),
            now
        ],
    );

    match result {
        Ok(_) => query_one(
            conn,
            &format!("SELECT {} FROM subscriptions WHERE id = ?1", SUBSCRIPTION_COLS),
            &[&id],
        ),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_subscription_by_provider_id(
    conn: &Connection,
    stripe_subscription_id: &str,
) -> Result<Option<Subscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM subscriptions WHERE stripe_subscription_id = ?1",
            SUBSCRIPTION_COLS
        ),
        &[&stripe_subscription_id],
    )
}
