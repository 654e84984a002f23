//! Stripe webhook endpoint.
//!
//! Verifies the signature, parses the event envelope, expands the minimal
//! payload via the Stripe API where needed and hands a fully-typed event to
//! the fulfillment pipelines. Responses follow the webhook convention: 200
//! acknowledges (including benign no-ops, so Stripe stops redelivering),
//! 5xx asks for redelivery, which the idempotency layers absorb.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::AppState;
use crate::fulfillment::{
    self, CheckoutEvent, CheckoutOutcome, EventAddress, EventLineItem, RefundOutcome,
};
use crate::models::CustomerContact;
use crate::payments::{StripeCharge, StripeCheckoutSession, StripeLineItem, StripeWebhookEvent};

/// Result type for webhook operations.
pub type WebhookResult = (StatusCode, &'static str);

/// Axum handler for Stripe webhooks.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = match headers.get("stripe-signature") {
        Some(sig) => match sig.to_str() {
            Ok(s) => s.to_string(),
            Err(e) => {
                tracing::debug!("Invalid UTF-8 in Stripe signature header: {}", e);
                return (StatusCode::BAD_REQUEST, "Invalid signature header");
            }
        },
        None => return (StatusCode::BAD_REQUEST, "Missing stripe-signature header"),
    };

    match state.stripe.verify_webhook_signature(&body, &signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, "Invalid signature"),
        Err(e) => {
            tracing::error!("Signature verification error: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid signature header");
        }
    }

    let event: StripeWebhookEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to parse Stripe webhook: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    match event.event_type.as_str() {
        "checkout.session.completed" => handle_checkout_completed(&state, &event)
            .await
            .unwrap_or_else(|e| e),
        "charge.refunded" => handle_charge_refunded(&state, &event)
            .await
            .unwrap_or_else(|e| e),
        _ => (StatusCode::OK, "Event ignored"),
    }
}

async fn handle_checkout_completed(
    state: &AppState,
    event: &StripeWebhookEvent,
) -> Result<WebhookResult, WebhookResult> {
    let session: StripeCheckoutSession = serde_json::from_value(event.data.object.clone())
        .map_err(|e| {
            tracing::error!("Failed to parse checkout session: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid checkout session")
        })?;

    if session.payment_status != "paid" {
        return Ok((StatusCode::OK, "Session not paid, ignored"));
    }

    // A session without a customer email can never be fulfilled; retrying
    // won't change the payload, so acknowledge and leave a trace.
    let has_email = session
        .customer_details
        .as_ref()
        .and_then(|d| d.email.as_deref())
        .map(str::trim)
        .is_some_and(|e| !e.is_empty());
    if !has_email {
        tracing::error!("Checkout session {} has no customer email", session.id);
        return Ok((StatusCode::OK, "No customer email"));
    }

    // The webhook payload is deliberately minimal; line items need a
    // follow-up API call. This failure is transient, so ask for redelivery.
    let line_items = state
        .stripe
        .fetch_checkout_line_items(&session.id)
        .await
        .map_err(|e| {
            tracing::error!(
                "Failed to fetch line items for session {}: {}",
                session.id,
                e
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Line item fetch failed")
        })?;

    let checkout = assemble_checkout_event(session, line_items);

    let mut conn = state.db.get().map_err(|e| {
        tracing::error!("DB connection error: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?;

    match fulfillment::process_checkout_completed(&mut conn, &state.services, &checkout).await {
        Ok(CheckoutOutcome::OrderCreated(_))
        | Ok(CheckoutOutcome::GiftCardIssued(_))
        | Ok(CheckoutOutcome::SubscriptionStarted(_)) => Ok((StatusCode::OK, "OK")),
        Ok(CheckoutOutcome::AlreadyProcessed) => Ok((StatusCode::OK, "Already processed")),
        Ok(CheckoutOutcome::Ignored(reason)) => Ok((StatusCode::OK, reason)),
        Err(e) => {
            tracing::error!(
                "Checkout processing failed for session {}: {}",
                checkout.checkout_session_id,
                e
            );
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Checkout processing failed",
            ))
        }
    }
}

async fn handle_charge_refunded(
    state: &AppState,
    event: &StripeWebhookEvent,
) -> Result<WebhookResult, WebhookResult> {
    let charge: StripeCharge = serde_json::from_value(event.data.object.clone()).map_err(|e| {
        tracing::error!("Failed to parse charge: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid charge")
    })?;

    if !charge.refunded {
        return Ok((StatusCode::OK, "Charge not refunded, ignored"));
    }

    let Some(payment_intent) = charge.payment_intent else {
        tracing::warn!("Refunded charge {} has no payment intent", charge.id);
        return Ok((StatusCode::OK, "No payment intent"));
    };

    let mut conn = state.db.get().map_err(|e| {
        tracing::error!("DB connection error: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?;

    match fulfillment::process_charge_refunded(&mut conn, &state.services, &payment_intent).await {
        Ok(RefundOutcome::Reconciled(_)) => Ok((StatusCode::OK, "OK")),
        Ok(RefundOutcome::UnknownPayment) => Ok((StatusCode::OK, "Order not found")),
        Err(e) => {
            tracing::error!(
                "Refund processing failed for payment intent {}: {}",
                payment_intent,
                e
            );
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Refund processing failed",
            ))
        }
    }
}

/// Split a full name into first/last on the first space.
fn split_name(full: &str) -> (Option<String>, Option<String>) {
    let full = full.trim();
    if full.is_empty() {
        return (None, None);
    }
    match full.split_once(' ') {
        Some((first, last)) => (Some(first.to_string()), Some(last.trim().to_string())),
        None => (Some(full.to_string()), None),
    }
}

fn convert_address(
    name: Option<&str>,
    address: Option<&crate::payments::StripeAddress>,
) -> Option<EventAddress> {
    let address = address?;
    let street = match (&address.line1, &address.line2) {
        (Some(l1), Some(l2)) => Some(format!("{} {}", l1, l2)),
        (Some(l1), None) => Some(l1.clone()),
        (None, Some(l2)) => Some(l2.clone()),
        (None, None) => None,
    };
    Some(EventAddress {
        name: name.map(String::from),
        street,
        postal_code: address.postal_code.clone(),
        city: address.city.clone(),
        country: address.country.clone(),
    })
}

fn convert_line_item(line: &StripeLineItem) -> EventLineItem {
    let quantity = line.quantity.unwrap_or(1).max(1);
    let stripe_product = line.price.as_ref().and_then(|p| p.product.as_ref());
    let catalog = stripe_product.map(|p| &p.metadata);

    let product_id = catalog
        .and_then(|m| m.product_id.clone())
        .or_else(|| stripe_product.map(|p| p.id.clone()))
        .unwrap_or_default();
    let variant_id = catalog.and_then(|m| m.variant_id.clone()).unwrap_or_default();
    let product_name = stripe_product
        .and_then(|p| p.name.clone())
        .or_else(|| line.description.clone())
        .unwrap_or_else(|| "Artikel".to_string());
    let variant_name = catalog
        .and_then(|m| m.variant_name.clone())
        .unwrap_or_default();

    let total_price_cents = line.amount_total.unwrap_or(0);
    let unit_price_cents = line
        .price
        .as_ref()
        .and_then(|p| p.unit_amount)
        .unwrap_or(total_price_cents / quantity);

    EventLineItem {
        product_id,
        variant_id,
        product_name,
        variant_name,
        quantity,
        unit_price_cents,
        total_price_cents,
    }
}

/// Assemble the pipeline event from the expanded session data. The metadata
/// map is parsed into the purchase-kind union exactly once, here.
fn assemble_checkout_event(
    session: StripeCheckoutSession,
    line_items: Vec<StripeLineItem>,
) -> CheckoutEvent {
    let kind = session.metadata.parse_kind();

    let details = session.customer_details.as_ref();
    let (first_name, last_name) = details
        .and_then(|d| d.name.as_deref())
        .map(split_name)
        .unwrap_or((None, None));

    let contact = CustomerContact {
        email: details
            .and_then(|d| d.email.clone())
            .unwrap_or_default(),
        first_name,
        last_name,
        phone: details.and_then(|d| d.phone.clone()),
        stripe_customer_id: session.customer.clone(),
    };

    let shipping = session.shipping_details.as_ref().and_then(|s| {
        convert_address(s.name.as_deref(), s.address.as_ref())
    });
    let billing = details.and_then(|d| convert_address(d.name.as_deref(), d.address.as_ref()));

    let total_cents = session.amount_total.unwrap_or(0);
    let subtotal_cents = session.amount_subtotal.unwrap_or(total_cents);
    let (discount_cents, shipping_cents) = session
        .total_details
        .as_ref()
        .map(|d| {
            (
                d.amount_discount.unwrap_or(0),
                d.amount_shipping.unwrap_or(0),
            )
        })
        .unwrap_or((0, 0));

    CheckoutEvent {
        checkout_session_id: session.id,
        payment_intent_id: session.payment_intent,
        provider_subscription_id: session.subscription,
        contact,
        shipping,
        billing,
        line_items: line_items.iter().map(convert_line_item).collect(),
        currency: session
            .currency
            .unwrap_or_else(|| "eur".to_string())
            .to_lowercase(),
        subtotal_cents,
        discount_cents,
        shipping_cents,
        total_cents,
        kind,
    }
}
