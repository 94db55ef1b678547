//! Periodic reconciliation of PENDING orders against the gateway.
//!
//! Webhooks are at-least-once but not guaranteed: deliveries can be lost
//! entirely. The sweep polls the gateway for orders still PENDING and applies
//! the same conditional transition the webhook processor uses, so the two
//! paths cannot double-apply a status or double-send a notification.

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::models::{OrderStatus, ShopOrder};
use crate::shop;

/// Upper bound of orders examined per sweep. Oldest-updated first, so every
/// pending order is eventually revisited even when the backlog exceeds this.
pub const RECONCILE_BATCH_SIZE: i64 = 100;

/// One reconciliation pass. Per-order gateway errors are logged and skipped;
/// the order stays PENDING and is retried on the next sweep. One order's
/// failure never aborts the batch.
pub async fn reconcile_pending_orders(state: &AppState) {
    let pending = {
        let conn = match state.db.get() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("reconciliation: failed to get DB connection: {}", e);
                return;
            }
        };
        match queries::list_pending_orders(&conn, RECONCILE_BATCH_SIZE) {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!("reconciliation: failed to list pending orders: {}", e);
                return;
            }
        }
    };

    if pending.is_empty() {
        return;
    }
    tracing::debug!("reconciling {} pending orders", pending.len());

    for order in pending {
        if let Err(e) = reconcile_order(state, &order).await {
            tracing::warn!(order_id = %order.id, "reconciliation deferred to next sweep: {}", e);
        }
    }
}

async fn reconcile_order(state: &AppState, order: &ShopOrder) -> Result<()> {
    let session = state
        .stripe
        .retrieve_checkout_session(&order.stripe_checkout_session_id)
        .await?;

    if status_matches(session.payment_status.as_deref(), "paid") {
        apply(state, order, OrderStatus::Paid, session.payment_intent.as_deref()).await?;
        return Ok(());
    }

    if status_matches(session.status.as_deref(), "expired") {
        apply(state, order, OrderStatus::Expired, None).await?;
        return Ok(());
    }

    if let Some(ref intent_id) = order.stripe_payment_intent_id {
        let intent = state.stripe.retrieve_payment_intent(intent_id).await?;
        if let Some(next) = decide_from_intent_status(&intent.status) {
            apply(state, order, next, None).await?;
        }
    }

    Ok(())
}

fn status_matches(status: Option<&str>, expected: &str) -> bool {
    status.is_some_and(|s| s.eq_ignore_ascii_case(expected))
}

/// Map a payment-intent status to the order status it implies, if any.
pub fn decide_from_intent_status(intent_status: &str) -> Option<OrderStatus> {
    if intent_status.eq_ignore_ascii_case("succeeded") {
        Some(OrderStatus::Paid)
    } else if intent_status.eq_ignore_ascii_case("canceled")
        || intent_status.eq_ignore_ascii_case("requires_payment_method")
    {
        Some(OrderStatus::Failed)
    } else {
        None
    }
}

async fn apply(
    state: &AppState,
    order: &ShopOrder,
    next: OrderStatus,
    payment_intent_id: Option<&str>,
) -> Result<()> {
    let changed = {
        let conn = state.db.get()?;
        queries::transition_order_status(&conn, &order.id, next, payment_intent_id)?
    };

    if changed {
        tracing::info!(order_id = %order.id, status = next.as_str(), "reconciliation transitioned order");
        shop::notify_status_change(state, order, next).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_from_intent_status() {
        assert_eq!(decide_from_intent_status("succeeded"), Some(OrderStatus::Paid));
        assert_eq!(decide_from_intent_status("SUCCEEDED"), Some(OrderStatus::Paid));
        assert_eq!(decide_from_intent_status("canceled"), Some(OrderStatus::Failed));
        assert_eq!(
            decide_from_intent_status("requires_payment_method"),
            Some(OrderStatus::Failed)
        );
        // Still in flight: leave the order PENDING for the next sweep
        assert_eq!(decide_from_intent_status("processing"), None);
        assert_eq!(decide_from_intent_status("requires_action"), None);
    }
}
