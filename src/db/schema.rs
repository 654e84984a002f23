use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Customers (identity keyed by lowercased email)
        CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT,
            last_name TEXT,
            phone TEXT,
            stripe_customer_id TEXT,
            referral_trusted INTEGER NOT NULL DEFAULT 0,
            referral_suspended INTEGER NOT NULL DEFAULT 0,
            referral_notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_customers_email ON customers(email);

        -- Catalog
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            brand TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_products_brand_active ON products(brand) WHERE active = 1;

        CREATE TABLE IF NOT EXISTS product_variants (
            id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            price_cents INTEGER NOT NULL,
            stock INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_variants_product ON product_variants(product_id);

        -- Orders (one per checkout session, enforced by the UNIQUE constraint
        -- as the last idempotency layer behind the pre-insert checks)
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            order_number TEXT NOT NULL UNIQUE,
            customer_id TEXT NOT NULL REFERENCES customers(id),
            email TEXT NOT NULL,
            phone TEXT,
            shipping_name TEXT NOT NULL,
            shipping_street TEXT NOT NULL,
            shipping_postal_code TEXT NOT NULL,
            shipping_city TEXT NOT NULL,
            shipping_country TEXT NOT NULL,
            subtotal_cents INTEGER NOT NULL,
            discount_cents INTEGER NOT NULL DEFAULT 0,
            shipping_cents INTEGER NOT NULL DEFAULT 0,
            total_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            payment_status TEXT NOT NULL CHECK (payment_status IN ('paid', 'refunded', 'failed')),
            status TEXT NOT NULL CHECK (status IN ('paid', 'shipped', 'delivered', 'refunded', 'payment_failed')),
            checkout_session_id TEXT NOT NULL UNIQUE,
            payment_intent_id TEXT,
            invoice_id TEXT,
            invoice_number TEXT,
            credit_note_id TEXT,
            credit_note_number TEXT,
            refunded_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id);
        CREATE INDEX IF NOT EXISTS idx_orders_payment_intent ON orders(payment_intent_id);

        CREATE TABLE IF NOT EXISTS order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL,
            variant_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            variant_name TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            unit_price_cents INTEGER NOT NULL,
            total_price_cents INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);

        -- Referral program
        CREATE TABLE IF NOT EXISTS referral_codes (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL UNIQUE REFERENCES customers(id) ON DELETE CASCADE,
            code TEXT NOT NULL UNIQUE,
            active INTEGER NOT NULL DEFAULT 1,
            usage_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_referral_codes_code ON referral_codes(code);

        -- One referral per referred identity, ever
        CREATE TABLE IF NOT EXISTS referrals (
            id TEXT PRIMARY KEY,
            referral_code_id TEXT NOT NULL REFERENCES referral_codes(id),
            referrer_id TEXT NOT NULL REFERENCES customers(id),
            referred_customer_id TEXT NOT NULL REFERENCES customers(id),
            referred_email TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL CHECK (status IN ('qualified', 'rewarded')),
            order_id TEXT REFERENCES orders(id),
            reward_id TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referrals(referrer_id);

        CREATE TABLE IF NOT EXISTS referral_rewards (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES customers(id),
            referral_id TEXT NOT NULL REFERENCES referrals(id),
            product_id TEXT NOT NULL,
            variant_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            variant_name TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('pending', 'claimed')),
            claimed_order_id TEXT,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_rewards_customer ON referral_rewards(customer_id);

        -- Gift cards (balance is bookkeeping; discounts happen at the payment layer)
        CREATE TABLE IF NOT EXISTS gift_cards (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            checkout_session_id TEXT UNIQUE,
            purchaser_customer_id TEXT REFERENCES customers(id),
            recipient_email TEXT,
            initial_balance_cents INTEGER NOT NULL,
            balance_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Subscriptions (mirrored from the payment provider)
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL REFERENCES customers(id),
            stripe_subscription_id TEXT NOT NULL UNIQUE,
            product_id TEXT NOT NULL,
            variant_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            variant_name TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            interval_weeks INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('active', 'cancelled')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_customer ON subscriptions(customer_id);
        "#,
    )
}
