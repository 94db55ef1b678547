//! Webhook event processing.
//!
//! Verification happens at the HTTP handler; this module applies exactly one
//! state transition per event. Deduplication, the conditional status update,
//! and the processed-event record all execute inside a single IMMEDIATE
//! transaction. Notifications belong to the caller, after commit, and only
//! when the transition actually changed a row.

use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::Result;
use crate::models::{OrderStatus, ShopOrder};
use crate::payments::{StripeCharge, StripeCheckoutSession, StripePaymentIntent, StripeWebhookEvent};

/// Apply a verified webhook event.
///
/// Returns the order and target status when a transition happened, which the
/// caller uses to fire the matching notification. Duplicates, unknown event
/// types, and events referencing orders we never tracked all return `None`
/// and are acknowledged as success upstream.
pub fn process_event(
    conn: &mut Connection,
    event: &StripeWebhookEvent,
) -> Result<Option<(ShopOrder, OrderStatus)>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if queries::processed_event_exists(&tx, &event.id)? {
        return Ok(None);
    }

    let change = match event.event_type.as_str() {
        "checkout.session.completed" => {
            apply_session_event(&tx, &event.data.object, OrderStatus::Paid)?
        }
        "checkout.session.expired" => {
            apply_session_event(&tx, &event.data.object, OrderStatus::Expired)?
        }
        "payment_intent.payment_failed" => {
            let intent: StripePaymentIntent = serde_json::from_value(event.data.object.clone())?;
            apply_intent_failure(&tx, &intent.id)?
        }
        "charge.failed" => {
            let charge: StripeCharge = serde_json::from_value(event.data.object.clone())?;
            match charge.payment_intent {
                Some(ref intent_id) => apply_intent_failure(&tx, intent_id)?,
                None => None,
            }
        }
        // Unhandled event types are acknowledged without being recorded.
        _ => return Ok(None),
    };

    match queries::record_processed_event(&tx, &event.id, &event.event_type) {
        Ok(()) => {}
        Err(ref e) if queries::is_unique_violation(e) => {
            // A concurrent delivery of the same event id won the race and
            // already did the work. Not an error.
            tracing::debug!(event_id = %event.id, "duplicate webhook delivery raced, skipping");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    tx.commit()?;
    Ok(change)
}

/// Transition the order referenced by a checkout session, capturing the
/// payment-intent id when the event carries one.
fn apply_session_event(
    conn: &Connection,
    object: &serde_json::Value,
    next: OrderStatus,
) -> Result<Option<(ShopOrder, OrderStatus)>> {
    let session: StripeCheckoutSession = serde_json::from_value(object.clone())?;

    let Some(order) = queries::get_order_by_session_id(conn, &session.id)? else {
        // Events may reference sessions we never tracked (e.g. dashboard
        // test events). Skip silently.
        tracing::debug!(session_id = %session.id, "webhook for unknown checkout session, skipping");
        return Ok(None);
    };

    let changed =
        queries::transition_order_status(conn, &order.id, next, session.payment_intent.as_deref())?;
    Ok(changed.then_some((order, next)))
}

/// Mark the order behind a failed payment intent as FAILED.
fn apply_intent_failure(
    conn: &Connection,
    payment_intent_id: &str,
) -> Result<Option<(ShopOrder, OrderStatus)>> {
    let Some(order) = queries::get_order_by_payment_intent_id(conn, payment_intent_id)? else {
        tracing::debug!(payment_intent_id = %payment_intent_id, "webhook for unknown payment intent, skipping");
        return Ok(None);
    };

    let changed = queries::transition_order_status(conn, &order.id, OrderStatus::Failed, None)?;
    Ok(changed.then_some((order, OrderStatus::Failed)))
}
