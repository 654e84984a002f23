//! Invoice and credit-note document building and idempotence.

mod common;

use common::*;
use mokkalab::invoice::{
    build_credit_note_request, build_invoice_request, ensure_credit_note, ensure_invoice,
    DocumentKind,
};

fn insert_order(conn: &rusqlite::Connection, session: &str, discount_cents: i64) -> Order {
    let customer = queries::upsert_customer(
        conn,
        &CustomerContact {
            email: "anna@example.com".to_string(),
            first_name: Some("Anna".to_string()),
            last_name: Some("Bergmann".to_string()),
            ..Default::default()
        },
    )
    .unwrap();

    let subtotal = 2 * 899;
    let shipping = 490;
    let create = CreateOrder {
        order_number: format!("ML250614-{}", &session[session.len().saturating_sub(4)..].to_uppercase()),
        customer_id: customer.id,
        email: customer.email,
        phone: None,
        shipping_name: "Anna Bergmann".to_string(),
        shipping_street: "Hauptstr. 1".to_string(),
        shipping_postal_code: "50667".to_string(),
        shipping_city: "Koeln".to_string(),
        shipping_country: "DE".to_string(),
        subtotal_cents: subtotal,
        discount_cents,
        shipping_cents: shipping,
        total_cents: subtotal - discount_cents + shipping,
        currency: "eur".to_string(),
        checkout_session_id: session.to_string(),
        payment_intent_id: Some(format!("pi_{}", session)),
    };

    let order = match queries::insert_order(conn, &create).unwrap() {
        queries::OrderInsert::Created(order) => order,
        queries::OrderInsert::Conflict => panic!("unexpected conflict"),
    };

    queries::insert_order_item(
        conn,
        &order.id,
        &CreateOrderItem {
            product_id: "p1".to_string(),
            variant_id: "v1".to_string(),
            product_name: "Espresso Forte".to_string(),
            variant_name: "250g ganze Bohne".to_string(),
            quantity: 2,
            unit_price_cents: 899,
            total_price_cents: 1798,
        },
    )
    .unwrap();

    order
}

#[test]
fn test_invoice_request_lines_and_number() {
    let conn = setup_test_db();
    let order = insert_order(&conn, "cs_inv1", 300);
    let items = queries::list_order_items(&conn, &order.id).unwrap();

    let request = build_invoice_request(&order, &items);

    assert_eq!(request.kind, DocumentKind::Invoice);
    assert_eq!(request.number, format!("RE-{}", order.order_number.trim_start_matches("ML")));
    assert_eq!(request.buyer.name, "Anna Bergmann");
    assert_eq!(request.buyer.city, "Koeln");

    // Item line, shipping line, discount line
    assert_eq!(request.lines.len(), 3);
    assert_eq!(request.lines[0].name, "Espresso Forte (250g ganze Bohne)");
    assert_eq!(request.lines[0].total_cents, 1798);
    assert_eq!(request.lines[1].name, "Versand");
    assert_eq!(request.lines[1].total_cents, 490);
    assert_eq!(request.lines[2].name, "Rabatt");
    assert_eq!(request.lines[2].total_cents, -300);

    // Lines net out to the charged total
    let line_sum: i64 = request.lines.iter().map(|l| l.total_cents).sum();
    assert_eq!(line_sum, request.total_cents);
    assert_eq!(request.total_cents, 1798 - 300 + 490);
}

#[test]
fn test_invoice_shipping_line_shown_even_when_free() {
    let conn = setup_test_db();
    let mut order = insert_order(&conn, "cs_inv2", 0);
    order.shipping_cents = 0;
    order.total_cents = order.subtotal_cents;
    let items = queries::list_order_items(&conn, &order.id).unwrap();

    let request = build_invoice_request(&order, &items);

    let shipping = request
        .lines
        .iter()
        .find(|l| l.name == "Versand")
        .expect("free shipping must still be a visible line");
    assert_eq!(shipping.total_cents, 0);
    // No discount line when no discount was applied
    assert!(request.lines.iter().all(|l| l.name != "Rabatt"));
}

#[test]
fn test_invoice_buyer_placeholders_for_missing_address() {
    let conn = setup_test_db();
    let mut order = insert_order(&conn, "cs_inv3", 0);
    order.shipping_name = String::new();
    order.shipping_street = "  ".to_string();
    order.shipping_postal_code = String::new();
    order.shipping_city = String::new();
    order.shipping_country = String::new();
    let items = queries::list_order_items(&conn, &order.id).unwrap();

    let request = build_invoice_request(&order, &items);

    // Never empty, never a panic: placeholders all the way down
    assert_eq!(request.buyer.name, "anna@example.com");
    assert_eq!(request.buyer.street, "Nicht angegeben");
    assert_eq!(request.buyer.postal_code, "00000");
    assert_eq!(request.buyer.city, "Nicht angegeben");
    assert_eq!(request.buyer.country, "DE");
}

#[test]
fn test_credit_note_negates_lines_and_reverses_discount() {
    let conn = setup_test_db();
    let mut order = insert_order(&conn, "cs_cn1", 300);
    order.invoice_number = Some("RE-250614-CN01".to_string());
    let items = queries::list_order_items(&conn, &order.id).unwrap();

    let request = build_credit_note_request(&order, &items);

    assert_eq!(request.kind, DocumentKind::CreditNote);
    assert_eq!(request.number, "GS-RE-250614-CN01");

    assert_eq!(request.lines[0].total_cents, -1798);
    assert_eq!(request.lines[1].name, "Versand");
    assert_eq!(request.lines[1].total_cents, -490);
    // Reversing the discount adds value back
    assert_eq!(request.lines[2].name, "Rabatt");
    assert_eq!(request.lines[2].total_cents, 300);

    // Lines net out to the (negative) refunded total
    let line_sum: i64 = request.lines.iter().map(|l| l.total_cents).sum();
    assert_eq!(line_sum, request.total_cents);
    assert_eq!(request.total_cents, -(1798 - 300 + 490));
}

#[tokio::test]
async fn test_ensure_invoice_is_idempotent() {
    let mut conn = setup_test_db();
    let harness = test_services();
    let order = insert_order(&conn, "cs_once", 0);

    let first = ensure_invoice(&mut conn, harness.invoices.as_ref(), &order)
        .await
        .unwrap();
    assert_eq!(harness.invoices.call_count(), 1);

    // Second call sees the stored reference and skips the provider
    let stored = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    let second = ensure_invoice(&mut conn, harness.invoices.as_ref(), &stored)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(harness.invoices.call_count(), 1);
}

#[tokio::test]
async fn test_credit_note_requires_refunded_order() {
    let mut conn = setup_test_db();
    let harness = test_services();
    let order = insert_order(&conn, "cs_paid", 0);

    let result = ensure_credit_note(&mut conn, harness.invoices.as_ref(), &order).await;
    assert!(result.is_err(), "paid orders must not get credit notes");
    assert_eq!(harness.invoices.call_count(), 0);
}

#[tokio::test]
async fn test_ensure_credit_note_is_idempotent() {
    let mut conn = setup_test_db();
    let harness = test_services();
    let order = insert_order(&conn, "cs_cn2", 0);
    queries::mark_order_refunded(&conn, &order.id, now()).unwrap();
    let order = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();

    let first = ensure_credit_note(&mut conn, harness.invoices.as_ref(), &order)
        .await
        .unwrap();
    let stored = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    let second = ensure_credit_note(&mut conn, harness.invoices.as_ref(), &stored)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(harness.invoices.call_count(), 1);
}
