//! Refund reconciliation tests.

mod common;

use common::*;
use mokkalab::fulfillment::{process_charge_refunded, process_checkout_completed};

/// Create a paid order through the pipeline and return it.
async fn place_order(
    conn: &mut rusqlite::Connection,
    harness: &TestServices,
    session: &str,
    email: &str,
    meta: StandardOrderMeta,
) -> Order {
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
    push_line(&mut event, &product, &variant, 2);
    set_standard_meta(&mut event, meta);

    match process_checkout_completed(conn, &harness.services, &event)
        .await
        .expect("Pipeline should succeed")
    {
        CheckoutOutcome::OrderCreated(order) => order,
        other => panic!("expected OrderCreated, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refund_restores_stock_and_generates_credit_note() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    let variant = create_test_variant(&conn, &product.id, "250g", 899, 100);

    let order = place_order(&mut conn, &harness, "cs_rf", "anna@example.com", Default::default()).await;
    assert_eq!(queries::get_variant_by_id(&conn, &variant.id).unwrap().unwrap().stock, 98);

    let payment_intent = order.payment_intent_id.clone().unwrap();
    let outcome = process_charge_refunded(&mut conn, &harness.services, &payment_intent)
        .await
        .expect("Refund pipeline should succeed");
    let RefundOutcome::Reconciled(refunded) = outcome else {
        panic!("expected Reconciled");
    };

    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert!(refunded.refunded_at.is_some());

    // Stock restored
    assert_eq!(queries::get_variant_by_id(&conn, &variant.id).unwrap().unwrap().stock, 100);

    // Credit note derived from the invoice number and stored
    let invoice_number = refunded.invoice_number.clone().unwrap();
    assert_eq!(
        refunded.credit_note_number.as_deref(),
        Some(format!("GS-{}", invoice_number).as_str())
    );
    assert!(refunded.credit_note_id.is_some());

    // One invoice plus one credit note at the provider
    assert_eq!(harness.invoices.call_count(), 2);
}

#[tokio::test]
async fn test_refund_for_unknown_payment_intent_is_a_noop() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let outcome = process_charge_refunded(&mut conn, &harness.services, "pi_never_seen")
        .await
        .expect("Unknown payment intent must not error");
    assert!(matches!(outcome, RefundOutcome::UnknownPayment));
}

#[tokio::test]
async fn test_duplicate_refund_delivery_is_idempotent() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    let variant = create_test_variant(&conn, &product.id, "250g", 899, 100);

    let order = place_order(&mut conn, &harness, "cs_rf2", "anna@example.com", Default::default()).await;
    let payment_intent = order.payment_intent_id.clone().unwrap();

    for _ in 0..3 {
        process_charge_refunded(&mut conn, &harness.services, &payment_intent)
            .await
            .unwrap();
    }

    // Stock restored exactly once (back to 100, not 104)
    assert_eq!(queries::get_variant_by_id(&conn, &variant.id).unwrap().unwrap().stock, 100);
    // Credit note generated once: one invoice + one credit note overall
    assert_eq!(harness.invoices.call_count(), 2);
}

#[tokio::test]
async fn test_refund_does_not_revoke_referrer_reward() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    create_test_variant(&conn, &product.id, "250g", 899, 100);
    let (_, code) = setup_referrer(&conn, harness.rng.as_ref(), "referrer@example.com");

    let order = place_order(
        &mut conn,
        &harness,
        "cs_rfref",
        "new@example.com",
        StandardOrderMeta {
            referral_code: Some(code.code.clone()),
            ..Default::default()
        },
    )
    .await;

    let referral = queries::get_referral_by_referred_email(&conn, "new@example.com")
        .unwrap()
        .unwrap();
    assert_eq!(referral.status, ReferralStatus::Rewarded);
    let reward_before = queries::get_reward_by_referral(&conn, &referral.id).unwrap().unwrap();

    // Refund the referred customer's qualifying order
    let payment_intent = order.payment_intent_id.clone().unwrap();
    process_charge_refunded(&mut conn, &harness.services, &payment_intent)
        .await
        .unwrap();

    // The referrer keeps everything: the referred customer already converted
    let referral = queries::get_referral_by_id(&conn, &referral.id).unwrap().unwrap();
    assert_eq!(referral.status, ReferralStatus::Rewarded);
    let reward_after = queries::get_reward_by_referral(&conn, &referral.id).unwrap().unwrap();
    assert_eq!(reward_after.status, RewardStatus::Pending);
    assert_eq!(reward_after.expires_at, reward_before.expires_at);
}

#[tokio::test]
async fn test_refunded_order_counts_against_future_referrals() {
    let mut conn = setup_test_db();
    let harness = test_services();

    let product = create_test_product(&conn, "Espresso Forte", HOUSE_BRAND);
    create_test_variant(&conn, &product.id, "250g", 899, 100);
    let (referrer, code) = setup_referrer(&conn, harness.rng.as_ref(), "referrer@example.com");

    let order = place_order(
        &mut conn,
        &harness,
        "cs_hist",
        "new@example.com",
        StandardOrderMeta {
            referral_code: Some(code.code.clone()),
            ..Default::default()
        },
    )
    .await;

    let payment_intent = order.payment_intent_id.clone().unwrap();
    process_charge_refunded(&mut conn, &harness.services, &payment_intent)
        .await
        .unwrap();

    let outcomes = queries::referrer_order_outcomes(&conn, &referrer.id).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].refunded);
    assert!(outcomes[0].refunded_at.is_some());
}
