//! Gift-card purchases and balance bookkeeping.

use rusqlite::Connection;

use crate::db::queries;
use crate::email::{self, Mailer};
use crate::error::{AppError, Result};
use crate::models::{CreateGiftCard, Customer, GiftCard};
use crate::order_number::RandomSource;
use crate::payments::GiftCardPurchaseMeta;

use super::{CheckoutEvent, Services};

/// Outcome of a gift-card purchase event.
#[derive(Debug)]
pub enum GiftCardPurchase {
    Issued(GiftCard),
    AlreadyProcessed,
}

/// Issue a gift card for a paid checkout session.
///
/// Idempotent on the session id; duplicate deliveries find the existing
/// card via pre-check or the UNIQUE backstop and return without a second
/// card or a second email.
pub async fn process_gift_card_purchase(
    conn: &mut Connection,
    services: &Services,
    event: &CheckoutEvent,
    meta: &GiftCardPurchaseMeta,
) -> Result<GiftCardPurchase> {
    if queries::get_gift_card_by_session(conn, &event.checkout_session_id)?.is_some() {
        tracing::info!(
            "Gift card for session {} already issued, skipping",
            event.checkout_session_id
        );
        return Ok(GiftCardPurchase::AlreadyProcessed);
    }

    let purchaser = queries::upsert_customer(conn, &event.contact)?;

    let card = match insert_with_unique_code(conn, services, event, meta, &purchaser)? {
        Some(card) => card,
        None => return Ok(GiftCardPurchase::AlreadyProcessed),
    };

    tracing::info!(
        "Gift card {} issued over {} {} (session {})",
        card.code,
        card.initial_balance_cents,
        card.currency,
        event.checkout_session_id
    );

    let recipient = card
        .recipient_email
        .clone()
        .unwrap_or_else(|| purchaser.email.clone());
    let mail = email::gift_card_email(&recipient, &card.code, card.balance_cents, &card.currency);
    if let Err(e) = services.mailer.send(&mail).await {
        tracing::warn!("Failed to send gift card email for {}: {}", card.code, e);
    }

    Ok(GiftCardPurchase::Issued(card))
}

/// Insert the card, regenerating the code on a code collision. Returns None
/// when the session turns out to be already processed (lost race).
fn insert_with_unique_code(
    conn: &Connection,
    services: &Services,
    event: &CheckoutEvent,
    meta: &GiftCardPurchaseMeta,
    purchaser: &Customer,
) -> Result<Option<GiftCard>> {
    for _ in 0..5 {
        let code = format!("MLGC-{}", services.rng.base36(8));
        let created = queries::create_gift_card(
            conn,
            &CreateGiftCard {
                code,
                checkout_session_id: Some(event.checkout_session_id.clone()),
                purchaser_customer_id: Some(purchaser.id.clone()),
                recipient_email: meta.recipient_email.clone(),
                amount_cents: event.total_cents,
                currency: event.currency.clone(),
            },
        )?;

        match created {
            Some(card) => return Ok(Some(card)),
            None => {
                // UNIQUE fired: duplicate session (done) or code collision (retry)
                if queries::get_gift_card_by_session(conn, &event.checkout_session_id)?.is_some() {
                    return Ok(None);
                }
            }
        }
    }

    Err(AppError::Internal(
        "could not generate a unique gift card code".into(),
    ))
}

/// Decrement the stored balance for a gift card redeemed during checkout.
///
/// Pure bookkeeping: the discount was already applied at the payment layer,
/// so problems here are logged and never fail the order.
pub fn redeem_gift_card(conn: &Connection, gift_card_id: &str, amount_cents: i64) {
    match queries::debit_gift_card(conn, gift_card_id, amount_cents) {
        Ok(Some(new_balance)) => {
            tracing::info!(
                "Gift card {} debited by {}, new balance {}",
                gift_card_id,
                amount_cents,
                new_balance
            );
        }
        Ok(None) => {
            tracing::warn!(
                "Gift card {} not found for redemption of {}, balance not updated",
                gift_card_id,
                amount_cents
            );
        }
        Err(e) => {
            tracing::warn!(
                "Gift card {} balance update failed: {}",
                gift_card_id,
                e
            );
        }
    }
}
