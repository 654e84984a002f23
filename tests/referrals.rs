//! Referral recording and reward issuing through the order pipeline.

mod common;

use common::*;
use mokkalab::fulfillment::process_checkout_completed;

/// Run a standard order for `email` that uses `code`, returning the created
/// order id.
async fn order_with_code(
    conn: &mut rusqlite::Connection,
    harness: &TestServices,
    session: &str,
    email: &str,
    code: &str,
) -> String {
    let product = match queries::list_active_products(conn).unwrap().into_iter().next() {
        Some(p) => p,
        None => create_test_product(conn, "Espresso Forte", HOUSE_BRAND),
    };
    let variant = queries::list_variants_for_product(conn, &product.id)
        .unwrap()
        .into_iter()
        .next()
        .unwrap_or_else(|| create_test_variant(conn, &product.id, "250g", 899, 100));

    let mut event = standard_event(session, email);
    push_line(&mut event, &product, &variant, 1);
    set_standard_meta(
        &mut event,
        StandardOrderMeta {
            referral_code: Some(code.to_string()),
            ..Default::default()
        },
    );

    let outcome = process_checkout_completed(conn, &harness.services, &event)
        .await
        .expect("Pipeline should succeed");
    match outcome {
        CheckoutOutcome::OrderCreated(order) => order.id,
        other => panic!("expected OrderCreated, got {:?}", other),
    }
}

#[tokio::test]
async fn test_valid_referral_grants_reward() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    create_test_variant(&conn, &product.id, "250g", 899, 100);
    let (referrer, code) = setup_referrer(&conn, harness.rng.as_ref(), "referrer@example.com");

    order_with_code(&mut conn, &harness, "cs_ref1", "new@example.com", &code.code).await;

    let referral = queries::get_referral_by_referred_email(&conn, "new@example.com")
        .unwrap()
        .expect("Referral should exist");
    assert_eq!(referral.status, ReferralStatus::Rewarded);
    assert_eq!(referral.referrer_id, referrer.id);
    assert!(referral.order_id.is_some());

    let reward = queries::get_reward_by_referral(&conn, &referral.id)
        .unwrap()
        .expect("Reward should exist");
    assert_eq!(reward.status, RewardStatus::Pending);
    assert_eq!(reward.customer_id, referrer.id);
    assert_eq!(reward.product_name, "Espresso Forte");
    assert_eq!(referral.reward_id.as_deref(), Some(reward.id.as_str()));
    // One-year expiry
    assert!(reward.expires_at > now() + 360 * 86400);
    assert!(reward.expires_at <= now() + 366 * 86400);

    let code = queries::get_referral_code_by_code(&conn, &code.code).unwrap().unwrap();
    assert_eq!(code.usage_count, 1);
}

#[tokio::test]
async fn test_self_referral_creates_nothing() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    create_test_variant(&conn, &product.id, "250g", 899, 100);
    let (referrer, code) = setup_referrer(&conn, harness.rng.as_ref(), "referrer@example.com");

    // The code owner orders with their own code
    order_with_code(&mut conn, &harness, "cs_self", "referrer@example.com", &code.code).await;

    assert!(queries::get_referral_by_referred_email(&conn, "referrer@example.com")
        .unwrap()
        .is_none());
    let code = queries::get_referral_code_by_code(&conn, &code.code).unwrap().unwrap();
    assert_eq!(code.usage_count, 0);
    // No reward either
    assert!(queries::referrer_order_outcomes(&conn, &referrer.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_one_referral_per_referred_identity() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    create_test_variant(&conn, &product.id, "250g", 899, 100);
    let (_, first_code) = setup_referrer(&conn, harness.rng.as_ref(), "first@example.com");
    let (_, second_code) = setup_referrer(&conn, harness.rng.as_ref(), "second@example.com");

    order_with_code(&mut conn, &harness, "cs_r1", "new@example.com", &first_code.code).await;
    // Same identity orders again with a different referrer's code
    order_with_code(&mut conn, &harness, "cs_r2", "new@example.com", &second_code.code).await;

    let referral = queries::get_referral_by_referred_email(&conn, "new@example.com")
        .unwrap()
        .unwrap();
    assert_eq!(referral.referral_code_id, first_code.id);

    let second_code = queries::get_referral_code_by_code(&conn, &second_code.code)
        .unwrap()
        .unwrap();
    assert_eq!(second_code.usage_count, 0, "second code must not count a repeat identity");
}

#[tokio::test]
async fn test_suspended_referrer_gets_no_reward_but_referral_is_recorded() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    create_test_variant(&conn, &product.id, "250g", 899, 100);
    let (referrer, code) = setup_referrer(&conn, harness.rng.as_ref(), "referrer@example.com");
    queries::set_customer_referral_flags(&conn, &referrer.id, false, true, Some("fake accounts"))
        .unwrap();

    order_with_code(&mut conn, &harness, "cs_susp", "new@example.com", &code.code).await;

    let referral = queries::get_referral_by_referred_email(&conn, "new@example.com")
        .unwrap()
        .expect("Referral must still be recorded");
    assert_eq!(referral.status, ReferralStatus::Qualified);
    assert!(referral.reward_id.is_none());
    assert!(queries::get_reward_by_referral(&conn, &referral.id).unwrap().is_none());

    // Usage still counts: the referred customer's discount stood
    let code = queries::get_referral_code_by_code(&conn, &code.code).unwrap().unwrap();
    assert_eq!(code.usage_count, 1);
}

#[tokio::test]
async fn test_trusted_referrer_bypasses_refund_history() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    create_test_variant(&conn, &product.id, "250g", 899, 100);
    let (referrer, code) = setup_referrer(&conn, harness.rng.as_ref(), "referrer@example.com");

    // Three prior referrals, all refunded
    for i in 0..3 {
        let session = format!("cs_hist{}", i);
        let email = format!("ref{}@example.com", i);
        let order_id = order_with_code(&mut conn, &harness, &session, &email, &code.code).await;
        queries::mark_order_refunded(&conn, &order_id, now()).unwrap();
    }

    queries::set_customer_referral_flags(&conn, &referrer.id, true, false, None).unwrap();

    order_with_code(&mut conn, &harness, "cs_trusted", "fresh@example.com", &code.code).await;

    let referral = queries::get_referral_by_referred_email(&conn, "fresh@example.com")
        .unwrap()
        .unwrap();
    assert_eq!(referral.status, ReferralStatus::Rewarded, "trusted bypasses all abuse rules");
}

#[tokio::test]
async fn test_high_refund_rate_withholds_reward() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    create_test_variant(&conn, &product.id, "250g", 899, 100);
    let (_, code) = setup_referrer(&conn, harness.rng.as_ref(), "referrer@example.com");

    // Build up history: three referrals, two of them refunded (66%)
    for i in 0..3 {
        let session = format!("cs_hist{}", i);
        let email = format!("ref{}@example.com", i);
        let order_id = order_with_code(&mut conn, &harness, &session, &email, &code.code).await;
        if i < 2 {
            queries::mark_order_refunded(&conn, &order_id, past_timestamp(60)).unwrap();
        }
    }

    // The next referral is recorded but earns nothing
    order_with_code(&mut conn, &harness, "cs_next", "fourth@example.com", &code.code).await;

    let referral = queries::get_referral_by_referred_email(&conn, "fourth@example.com")
        .unwrap()
        .unwrap();
    assert_eq!(referral.status, ReferralStatus::Qualified);
    assert!(queries::get_reward_by_referral(&conn, &referral.id).unwrap().is_none());

    // Usage kept counting across all four uses
    let code = queries::get_referral_code_by_code(&conn, &code.code).unwrap().unwrap();
    assert_eq!(code.usage_count, 4);
}

#[tokio::test]
async fn test_inactive_code_is_skipped() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    create_test_variant(&conn, &product.id, "250g", 899, 100);
    let (_, code) = setup_referrer(&conn, harness.rng.as_ref(), "referrer@example.com");
    conn.execute(
        "UPDATE referral_codes SET active = 0 WHERE id = ?1",
        rusqlite::params![code.id],
    )
    .unwrap();

    order_with_code(&mut conn, &harness, "cs_inact", "new@example.com", &code.code).await;

    assert!(queries::get_referral_by_referred_email(&conn, "new@example.com")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_unknown_code_is_skipped() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    create_test_variant(&conn, &product.id, "250g", 899, 100);

    // Order goes through even though the code does not exist
    order_with_code(&mut conn, &harness, "cs_unknown", "new@example.com", "ML-NOSUCH").await;

    assert!(queries::get_referral_by_referred_email(&conn, "new@example.com")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_reward_product_falls_back_to_other_brands() {
    let mut conn = setup_test_db();
    let harness = test_services();

    // Only a non-house-brand product exists
    let tea = create_test_product(&conn, "Sencha", "Teelab");
    create_test_variant(&conn, &tea.id, "100g lose", 1190, 50);
    let (_, code) = setup_referrer(&conn, harness.rng.as_ref(), "referrer@example.com");

    order_with_code(&mut conn, &harness, "cs_fb", "new@example.com", &code.code).await;

    let referral = queries::get_referral_by_referred_email(&conn, "new@example.com")
        .unwrap()
        .unwrap();
    let reward = queries::get_reward_by_referral(&conn, &referral.id)
        .unwrap()
        .expect("Reward should fall back to any active product");
    assert_eq!(reward.product_name, "Sencha");
}
