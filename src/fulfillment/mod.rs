//! Fulfillment pipelines: the code path between a confirmed payment event
//! and durable domain state.
//!
//! The order pipeline turns one `checkout.session.completed` event into a
//! customer, an order with line-item snapshots, stock movements, referral
//! processing, an invoice and confirmation emails - exactly once, however
//! often and however concurrently the event is delivered. The refund
//! pipeline is its inverse for `charge.refunded`, minus rewards.
//!
//! Failure policy is deliberately asymmetric. The payment is already
//! captured when these pipelines run, so only the steps that make the order
//! exist (customer upsert, order insert, item inserts) may fail the event
//! and trigger redelivery. Everything after - stock, rewards, referrals,
//! gift-card bookkeeping, invoices, email - is logged and swallowed; those
//! can be repaired on demand.

pub mod gift_cards;
pub mod referral;
pub mod stock;
pub mod subscriptions;

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;

use crate::db::queries::{self, OrderInsert};
use crate::email::{self, Mailer};
use crate::error::{AppError, Result};
use crate::invoice::{ensure_credit_note, ensure_invoice, CreatedDocument, InvoiceProvider};
use crate::models::{
    CreateOrder, CreateOrderItem, CustomerContact, GiftCard, Order, OrderItem, OrderStatus,
    Subscription,
};
use crate::order_number::{generate_order_number, RandomSource};
use crate::payments::CheckoutKind;

use gift_cards::GiftCardPurchase;
use stock::StockLine;
use subscriptions::SubscriptionPurchase;

/// How often an order insert is retried when the random order-number suffix
/// collides.
const ORDER_NUMBER_ATTEMPTS: usize = 3;

/// Side-effect providers injected into the pipelines at construction time.
#[derive(Clone)]
pub struct Services {
    pub invoices: Arc<dyn InvoiceProvider>,
    pub mailer: Arc<dyn email::Mailer>,
    pub rng: Arc<dyn RandomSource>,
    /// Ops inbox for internal order notifications, if configured.
    pub internal_notification_email: Option<String>,
}

/// Address block as delivered by the payment provider.
#[derive(Debug, Clone, Default)]
pub struct EventAddress {
    pub name: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// One purchased line, already resolved against the catalog references the
/// provider carries in its product metadata.
#[derive(Debug, Clone)]
pub struct EventLineItem {
    pub product_id: String,
    pub variant_id: String,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
}

/// Fully-expanded checkout event, assembled at the webhook boundary.
///
/// The webhook payload itself is minimal; line items come from a follow-up
/// provider API call, and the metadata map is already parsed into the
/// [`CheckoutKind`] union before the pipeline sees it.
#[derive(Debug, Clone)]
pub struct CheckoutEvent {
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
    /// Provider subscription id, present on subscription checkouts.
    pub provider_subscription_id: Option<String>,
    pub contact: CustomerContact,
    /// Dedicated shipping block collected during checkout.
    pub shipping: Option<EventAddress>,
    /// Generic billing address, the fallback when no shipping block exists.
    pub billing: Option<EventAddress>,
    pub line_items: Vec<EventLineItem>,
    pub currency: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub kind: CheckoutKind,
}

/// Outcome of processing one completed checkout.
#[derive(Debug)]
pub enum CheckoutOutcome {
    OrderCreated(Order),
    GiftCardIssued(GiftCard),
    SubscriptionStarted(Subscription),
    /// Duplicate delivery of an event that already produced its state.
    AlreadyProcessed,
    /// The event cannot produce domain state; acknowledged so the provider
    /// stops redelivering.
    Ignored(&'static str),
}

/// Snapshot of the shipping address after the fallback chain.
struct ShippingSnapshot {
    name: String,
    street: String,
    postal_code: String,
    city: String,
    country: String,
}

/// Resolve the shipping snapshot: dedicated shipping block, then the billing
/// address, then empty strings. Missing address data never fails an order;
/// the invoice builder substitutes placeholders downstream.
fn resolve_shipping(event: &CheckoutEvent) -> ShippingSnapshot {
    let empty = EventAddress::default();
    let address = event
        .shipping
        .as_ref()
        .or(event.billing.as_ref())
        .unwrap_or(&empty);

    let fallback_name = || {
        event
            .shipping
            .as_ref()
            .and_then(|s| s.name.clone())
            .or_else(|| event.billing.as_ref().and_then(|b| b.name.clone()))
            .or_else(|| {
                match (&event.contact.first_name, &event.contact.last_name) {
                    (Some(f), Some(l)) => Some(format!("{} {}", f, l)),
                    (Some(f), None) => Some(f.clone()),
                    (None, Some(l)) => Some(l.clone()),
                    (None, None) => None,
                }
            })
    };

    let take = |v: &Option<String>| v.clone().unwrap_or_default();

    ShippingSnapshot {
        name: fallback_name().unwrap_or_default(),
        street: take(&address.street),
        postal_code: take(&address.postal_code),
        city: take(&address.city),
        country: take(&address.country),
    }
}

/// Process one `checkout.session.completed` event.
pub async fn process_checkout_completed(
    conn: &mut Connection,
    services: &Services,
    event: &CheckoutEvent,
) -> Result<CheckoutOutcome> {
    // Type dispatch first: gift-card and subscription purchases are mutually
    // exclusive with standalone order creation.
    let meta = match &event.kind {
        CheckoutKind::GiftCardPurchase(meta) => {
            return match gift_cards::process_gift_card_purchase(conn, services, event, meta)
                .await?
            {
                GiftCardPurchase::Issued(card) => Ok(CheckoutOutcome::GiftCardIssued(card)),
                GiftCardPurchase::AlreadyProcessed => Ok(CheckoutOutcome::AlreadyProcessed),
            };
        }
        CheckoutKind::SubscriptionPurchase(meta) => {
            return match subscriptions::process_subscription_purchase(conn, event, meta)? {
                SubscriptionPurchase::Started(sub) => {
                    Ok(CheckoutOutcome::SubscriptionStarted(sub))
                }
                SubscriptionPurchase::AlreadyProcessed => Ok(CheckoutOutcome::AlreadyProcessed),
                SubscriptionPurchase::Ignored(reason) => Ok(CheckoutOutcome::Ignored(reason)),
            };
        }
        CheckoutKind::StandardOrder(meta) => meta,
    };

    // Idempotency check #1: the provider delivers at least once, not exactly
    // once.
    if queries::get_order_by_checkout_session(conn, &event.checkout_session_id)?.is_some() {
        tracing::info!(
            "Order for session {} already exists, skipping",
            event.checkout_session_id
        );
        return Ok(CheckoutOutcome::AlreadyProcessed);
    }

    // Customer upsert is fatal: without a customer there is no order.
    let customer = queries::upsert_customer(conn, &event.contact)?;

    // Every customer gets a referral code on their first order. Non-fatal;
    // a missing code only means the customer cannot refer yet.
    if let Err(e) = queries::ensure_referral_code(conn, &customer.id, services.rng.as_ref()) {
        tracing::warn!(
            "Failed to ensure referral code for customer {}: {}",
            customer.id,
            e
        );
    }

    let shipping = resolve_shipping(event);

    // Idempotency check #2: re-check right before insert to shrink the
    // window a concurrent duplicate delivery can slip through. The UNIQUE
    // constraint below is the backstop for the window that remains.
    if queries::get_order_by_checkout_session(conn, &event.checkout_session_id)?.is_some() {
        tracing::info!(
            "Order for session {} created concurrently, skipping",
            event.checkout_session_id
        );
        return Ok(CheckoutOutcome::AlreadyProcessed);
    }

    let mut order: Option<Order> = None;
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let create = CreateOrder {
            order_number: generate_order_number(Utc::now(), services.rng.as_ref()),
            customer_id: customer.id.clone(),
            email: customer.email.clone(),
            phone: customer.phone.clone(),
            shipping_name: shipping.name.clone(),
            shipping_street: shipping.street.clone(),
            shipping_postal_code: shipping.postal_code.clone(),
            shipping_city: shipping.city.clone(),
            shipping_country: shipping.country.clone(),
            subtotal_cents: event.subtotal_cents,
            discount_cents: event.discount_cents,
            shipping_cents: event.shipping_cents,
            total_cents: event.total_cents,
            currency: event.currency.clone(),
            checkout_session_id: event.checkout_session_id.clone(),
            payment_intent_id: event.payment_intent_id.clone(),
        };

        match queries::insert_order(conn, &create)? {
            OrderInsert::Created(created) => {
                order = Some(created);
                break;
            }
            OrderInsert::Conflict => {
                // Idempotency check #3: a UNIQUE violation from a concurrent
                // duplicate delivery is benign. If no order exists for this
                // session, the random order-number suffix collided instead;
                // regenerate and retry.
                if queries::get_order_by_checkout_session(conn, &event.checkout_session_id)?
                    .is_some()
                {
                    tracing::info!(
                        "Order for session {} created by concurrent delivery, skipping",
                        event.checkout_session_id
                    );
                    return Ok(CheckoutOutcome::AlreadyProcessed);
                }
                tracing::warn!(
                    "Order number collision for session {}, regenerating",
                    event.checkout_session_id
                );
            }
        }
    }

    let Some(order) = order else {
        return Err(AppError::Internal(format!(
            "order insert failed after {} number collisions (session {})",
            ORDER_NUMBER_ATTEMPTS, event.checkout_session_id
        )));
    };

    // Item inserts are fatal: an order without its lines is worse than a
    // retried event.
    let mut items: Vec<OrderItem> = Vec::with_capacity(event.line_items.len());
    let mut stock_lines: Vec<StockLine> = Vec::with_capacity(event.line_items.len());
    for line in &event.line_items {
        let item = queries::insert_order_item(
            conn,
            &order.id,
            &CreateOrderItem {
                product_id: line.product_id.clone(),
                variant_id: line.variant_id.clone(),
                product_name: line.product_name.clone(),
                variant_name: line.variant_name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                total_price_cents: line.total_price_cents,
            },
        )?;
        stock_lines.push(StockLine {
            product_id: item.product_id.clone(),
            variant_id: item.variant_id.clone(),
            quantity: item.quantity,
        });
        items.push(item);
    }

    // From here on everything is best-effort.
    stock::deduct(conn, &stock_lines);

    for reward_id in &meta.claimed_reward_ids {
        match queries::claim_reward(conn, reward_id, &order.id) {
            Ok(true) => {
                tracing::info!("Reward {} claimed by order {}", reward_id, order.order_number)
            }
            Ok(false) => tracing::warn!(
                "Reward {} could not be claimed by order {}: unknown or not pending",
                reward_id,
                order.order_number
            ),
            Err(e) => tracing::warn!(
                "Reward {} claim failed for order {}: {}",
                reward_id,
                order.order_number,
                e
            ),
        }
    }

    if let Some(code) = &meta.referral_code {
        match referral::process_referral(
            conn,
            services.rng.as_ref(),
            code,
            &customer,
            &order.id,
            Utc::now().timestamp(),
        ) {
            Ok(referral::ReferralOutcome::Rewarded { reward_id, .. }) => {
                tracing::info!(
                    "Referral processed for order {}: reward {} granted",
                    order.order_number,
                    reward_id
                );
            }
            Ok(referral::ReferralOutcome::RecordedWithoutReward { reason, .. }) => {
                tracing::info!(
                    "Referral recorded for order {} without reward: {}",
                    order.order_number,
                    reason
                );
            }
            Ok(referral::ReferralOutcome::Skipped { reason }) => {
                tracing::info!(
                    "Referral skipped for order {}: {}",
                    order.order_number,
                    reason
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Referral processing failed for order {}: {}",
                    order.order_number,
                    e
                );
            }
        }
    }

    if let Some(redemption) = &meta.gift_card {
        gift_cards::redeem_gift_card(conn, &redemption.gift_card_id, redemption.amount_cents);
    }

    let invoice = match ensure_invoice(conn, services.invoices.as_ref(), &order).await {
        Ok(document) => Some(document),
        Err(e) => {
            tracing::warn!(
                "Invoice generation failed for order {}: {}",
                order.order_number,
                e
            );
            None
        }
    };

    send_order_emails(services, &order, &items, invoice.as_ref()).await;

    tracing::info!(
        "Checkout completed: order={}, customer={}, items={}, total={} {}",
        order.order_number,
        customer.id,
        items.len(),
        order.total_cents,
        order.currency
    );

    // Return the stored state including any invoice reference set above.
    let order = queries::get_order_by_id(conn, &order.id)?.unwrap_or(order);
    Ok(CheckoutOutcome::OrderCreated(order))
}

/// Send the confirmation and internal notification emails, attaching the
/// invoice PDF when the invoice exists and renders.
async fn send_order_emails(
    services: &Services,
    order: &Order,
    items: &[OrderItem],
    invoice: Option<&CreatedDocument>,
) {
    let pdf = match invoice {
        Some(document) => match services.invoices.fetch_pdf(&document.id).await {
            Ok(bytes) => Some((document.number.clone(), bytes)),
            Err(e) => {
                tracing::warn!(
                    "Invoice PDF fetch failed for order {}: {}",
                    order.order_number,
                    e
                );
                None
            }
        },
        None => None,
    };

    let confirmation = email::order_confirmation_email(order, items, pdf);
    if let Err(e) = services.mailer.send(&confirmation).await {
        tracing::warn!(
            "Failed to send confirmation email for order {}: {}",
            order.order_number,
            e
        );
    }

    if let Some(to) = &services.internal_notification_email {
        let notification = email::internal_order_notification(to, order, items);
        if let Err(e) = services.mailer.send(&notification).await {
            tracing::warn!(
                "Failed to send internal notification for order {}: {}",
                order.order_number,
                e
            );
        }
    }
}

/// Outcome of processing one `charge.refunded` event.
#[derive(Debug)]
pub enum RefundOutcome {
    Reconciled(Order),
    /// No order matches the payment intent; acknowledged, retrying cannot
    /// help.
    UnknownPayment,
}

/// Process one `charge.refunded` event, keyed by the payment-intent id.
///
/// Restores stock, flips the order to refunded and generates a credit note.
/// Referral and reward records tied to this order as a *referred* order are
/// deliberately left untouched: the referrer's reward was earned by bringing
/// in a new registered customer, and that value survives the refund.
pub async fn process_charge_refunded(
    conn: &mut Connection,
    services: &Services,
    payment_intent_id: &str,
) -> Result<RefundOutcome> {
    let Some(order) = queries::get_order_by_payment_intent(conn, payment_intent_id)? else {
        tracing::info!(
            "No order for payment intent {}, ignoring refund",
            payment_intent_id
        );
        return Ok(RefundOutcome::UnknownPayment);
    };

    if order.status == OrderStatus::Refunded {
        tracing::info!(
            "Order {} already refunded, skipping stock restore",
            order.order_number
        );
    } else {
        let items = queries::list_order_items(conn, &order.id)?;
        let lines: Vec<StockLine> = items
            .iter()
            .map(|item| StockLine {
                product_id: item.product_id.clone(),
                variant_id: item.variant_id.clone(),
                quantity: item.quantity,
            })
            .collect();
        stock::restore(conn, &lines);

        queries::mark_order_refunded(conn, &order.id, Utc::now().timestamp())?;
        tracing::info!("Order {} marked refunded", order.order_number);
    }

    let order = queries::get_order_by_id(conn, &order.id)?
        .ok_or_else(|| AppError::Internal("order vanished during refund".into()))?;

    if let Err(e) = ensure_credit_note(conn, services.invoices.as_ref(), &order).await {
        tracing::warn!(
            "Credit note generation failed for order {}: {}",
            order.order_number,
            e
        );
    }

    let order = queries::get_order_by_id(conn, &order.id)?.unwrap_or(order);
    Ok(RefundOutcome::Reconciled(order))
}
