//! Subscription purchase delegate.
//!
//! A checkout marked as a subscription purchase mirrors the provider's
//! subscription into the local table; recurring billing itself stays with
//! the provider.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{CreateSubscription, Subscription};
use crate::payments::SubscriptionPurchaseMeta;

use super::CheckoutEvent;

/// Outcome of a subscription purchase event.
#[derive(Debug)]
pub enum SubscriptionPurchase {
    Started(Subscription),
    AlreadyProcessed,
    /// The event lacked the data to mirror anything; acknowledged so the
    /// provider stops redelivering.
    Ignored(&'static str),
}

pub fn process_subscription_purchase(
    conn: &Connection,
    event: &CheckoutEvent,
    meta: &SubscriptionPurchaseMeta,
) -> Result<SubscriptionPurchase> {
    let Some(provider_subscription_id) = event.provider_subscription_id.as_deref() else {
        tracing::warn!(
            "Subscription checkout {} has no provider subscription id, nothing to mirror",
            event.checkout_session_id
        );
        return Ok(SubscriptionPurchase::Ignored("no subscription id"));
    };

    if queries::get_subscription_by_provider_id(conn, provider_subscription_id)?.is_some() {
        tracing::info!(
            "Subscription {} already mirrored, skipping",
            provider_subscription_id
        );
        return Ok(SubscriptionPurchase::AlreadyProcessed);
    }

    let Some(line) = event.line_items.first() else {
        tracing::warn!(
            "Subscription checkout {} has no line items, nothing to mirror",
            event.checkout_session_id
        );
        return Ok(SubscriptionPurchase::Ignored("no line items"));
    };

    let customer = queries::upsert_customer(conn, &event.contact)?;

    let created = queries::create_subscription(
        conn,
        &CreateSubscription {
            customer_id: customer.id,
            stripe_subscription_id: provider_subscription_id.to_string(),
            product_id: line.product_id.clone(),
            variant_id: line.variant_id.clone(),
            product_name: line.product_name.clone(),
            variant_name: line.variant_name.clone(),
            quantity: line.quantity,
            interval_weeks: meta.interval_weeks,
        },
    )?;

    match created {
        Some(subscription) => {
            tracing::info!(
                "Subscription {} mirrored for customer {} ({} every {} weeks)",
                subscription.stripe_subscription_id,
                subscription.customer_id,
                subscription.product_name,
                subscription.interval_weeks
            );
            Ok(SubscriptionPurchase::Started(subscription))
        }
        // Lost the insert race against a duplicate delivery
        None => Ok(SubscriptionPurchase::AlreadyProcessed),
    }
}
