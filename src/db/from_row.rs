//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on unexpected database content.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const CUSTOMER_COLS: &str = "id, email, first_name, last_name, phone, stripe_customer_id, referral_trusted, referral_suspended, referral_notes, created_at, updated_at";

pub const PRODUCT_COLS: &str = "id, name, brand, active, created_at";

pub const VARIANT_COLS: &str = "id, product_id, name, price_cents, stock, created_at";

pub const ORDER_COLS: &str = "id, order_number, customer_id, email, phone, shipping_name, shipping_street, shipping_postal_code, shipping_city, shipping_country, subtotal_cents, discount_cents, shipping_cents, total_cents, currency, payment_status, status, checkout_session_id, payment_intent_id, invoice_id, invoice_number, credit_note_id, credit_note_number, refunded_at, created_at, updated_at";

pub const ORDER_ITEM_COLS: &str = "id, order_id, product_id, variant_id, product_name, variant_name, quantity, unit_price_cents, total_price_cents";

pub const REFERRAL_CODE_COLS: &str = "id, customer_id, code, active, usage_count, created_at";

pub const REFERRAL_COLS: &str = "id, referral_code_id, referrer_id, referred_customer_id, referred_email, status, order_id, reward_id, created_at";

pub const REWARD_COLS: &str = "id, customer_id, referral_id, product_id, variant_id, product_name, variant_name, status, claimed_order_id, expires_at, created_at";

pub const GIFT_CARD_COLS: &str = "id, code, checkout_session_id, purchaser_customer_id, recipient_email, initial_balance_cents, balance_cents, currency, active, created_at, updated_at";

pub const SUBSCRIPTION_COLS: &str = "id, customer_id, stripe_subscription_id, product_id, variant_id, product_name, variant_name, quantity, interval_weeks, status, created_at, updated_at";

// ============ FromRow Implementations ============

impl FromRow for Customer {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Customer {
            id: row.get(0)?,
            email: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            phone: row.get(4)?,
            stripe_customer_id: row.get(5)?,
            referral_trusted: row.get::<_, i32>(6)? != 0,
            referral_suspended: row.get::<_, i32>(7)? != 0,
            referral_notes: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for Product {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Product {
            id: row.get(0)?,
            name: row.get(1)?,
            brand: row.get(2)?,
            active: row.get::<_, i32>(3)? != 0,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for ProductVariant {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ProductVariant {
            id: row.get(0)?,
            product_id: row.get(1)?,
            name: row.get(2)?,
            price_cents: row.get(3)?,
            stock: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            order_number: row.get(1)?,
            customer_id: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            shipping_name: row.get(5)?,
            shipping_street: row.get(6)?,
            shipping_postal_code: row.get(7)?,
            shipping_city: row.get(8)?,
            shipping_country: row.get(9)?,
            subtotal_cents: row.get(10)?,
            discount_cents: row.get(11)?,
            shipping_cents: row.get(12)?,
            total_cents: row.get(13)?,
            currency: row.get(14)?,
            payment_status: parse_enum(row, 15, "payment_status")?,
            status: parse_enum(row, 16, "status")?,
            checkout_session_id: row.get(17)?,
            payment_intent_id: row.get(18)?,
            invoice_id: row.get(19)?,
            invoice_number: row.get(20)?,
            credit_note_id: row.get(21)?,
            credit_note_number: row.get(22)?,
            refunded_at: row.get(23)?,
            created_at: row.get(24)?,
            updated_at: row.get(25)?,
        })
    }
}

impl FromRow for OrderItem {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(OrderItem {
            id: row.get(0)?,
            order_id: row.get(1)?,
            product_id: row.get(2)?,
            variant_id: row.get(3)?,
            product_name: row.get(4)?,
            variant_name: row.get(5)?,
            quantity: row.get(6)?,
            unit_price_cents: row.get(7)?,
            total_price_cents: row.get(8)?,
        })
    }
}

impl FromRow for ReferralCode {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ReferralCode {
            id: row.get(0)?,
            customer_id: row.get(1)?,
            code: row.get(2)?,
            active: row.get::<_, i32>(3)? != 0,
            usage_count: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for Referral {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Referral {
            id: row.get(0)?,
            referral_code_id: row.get(1)?,
            referrer_id: row.get(2)?,
            referred_customer_id: row.get(3)?,
            referred_email: row.get(4)?,
            status: parse_enum(row, 5, "status")?,
            order_id: row.get(6)?,
            reward_id: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl FromRow for ReferralReward {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ReferralReward {
            id: row.get(0)?,
            customer_id: row.get(1)?,
            referral_id: row.get(2)?,
            product_id: row.get(3)?,
            variant_id: row.get(4)?,
            product_name: row.get(5)?,
            variant_name: row.get(6)?,
            status: parse_enum(row, 7, "status")?,
            claimed_order_id: row.get(8)?,
            expires_at: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

impl FromRow for GiftCard {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(GiftCard {
            id: row.get(0)?,
            code: row.get(1)?,
            checkout_session_id: row.get(2)?,
            purchaser_customer_id: row.get(3)?,
            recipient_email: row.get(4)?,
            initial_balance_cents: row.get(5)?,
            balance_cents: row.get(6)?,
            currency: row.get(7)?,
            active: row.get::<_, i32>(8)? != 0,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl FromRow for Subscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: row.get(0)?,
            customer_id: row.get(1)?,
            stripe_subscription_id: row.get(2)?,
            product_id: row.get(3)?,
            variant_id: row.get(4)?,
            product_name: row.get(5)?,
            variant_name: row.get(6)?,
            quantity: row.get(7)?,
            interval_weeks: row.get(8)?,
            status: parse_enum(row, 9, "status")?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}
