//! Order lifecycle: catalog, checkout orchestration, and the shared
//! status-transition/notification helper used by both the webhook
//! processor and the reconciliation sweep.

pub mod reconcile;
pub mod webhook;

use uuid::Uuid;

use crate::db::{queries, AppState};
use crate::error::{msg, AppError, Result};
use crate::models::{
    CheckoutSessionResponse, CreateOrder, OrderStatus, ShopOrder, ShopProduct, User,
};
use crate::payments::CreateSessionParams;

/// The product catalog. Static by design: changing it requires a restart.
pub fn catalog(currency: &str) -> Vec<ShopProduct> {
    vec![
        ShopProduct {
            id: "starter-pack",
            name: "Starter Pack",
            description: "Starter creative assets pack",
            amount_cents: 1900,
            currency: currency.to_string(),
        },
        ShopProduct {
            id: "pro-pack",
            name: "Pro Pack",
            description: "Expanded assets + premium templates",
            amount_cents: 4900,
            currency: currency.to_string(),
        },
        ShopProduct {
            id: "studio-pack",
            name: "Studio Pack",
            description: "Full bundle with lifetime updates",
            amount_cents: 9900,
            currency: currency.to_string(),
        },
    ]
}

pub fn find_product(product_id: &str, currency: &str) -> Option<ShopProduct> {
    catalog(currency).into_iter().find(|p| p.id == product_id)
}

/// Scope a caller-supplied idempotency key to the owning user so the same
/// key from two different users can never collide.
fn scope_idempotency_key(user_id: &str, key: Option<&str>) -> Option<String> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| format!("checkout:{}:{}", user_id, k))
}

/// Create (or idempotently replay) a checkout session for a catalog product.
///
/// When the scoped idempotency key already matches an order, the stored
/// gateway session is re-fetched and returned with no side effects. The
/// order row is only written after the gateway call succeeded, so a gateway
/// failure leaves no partial state behind.
pub async fn create_checkout_session(
    state: &AppState,
    user: &User,
    product_id: &str,
    idempotency_key: Option<&str>,
) -> Result<CheckoutSessionResponse> {
    let product = find_product(product_id, &state.currency)
        .ok_or_else(|| AppError::BadRequest(msg::INVALID_PRODUCT.into()))?;

    let conn = state.db.get()?;
    let scoped_key = scope_idempotency_key(&user.id, idempotency_key);

    if let Some(ref key) = scoped_key {
        if let Some(order) = queries::get_order_by_user_and_key(&conn, &user.id, key)? {
            let session = state
                .stripe
                .retrieve_checkout_session(&order.stripe_checkout_session_id)
                .await?;
            let checkout_url = session
                .url
                .ok_or_else(|| AppError::Gateway("checkout session no longer has a URL".into()))?;
            return Ok(CheckoutSessionResponse {
                checkout_url,
                session_id: session.id,
            });
        }
    }

    let customer_id = ensure_stripe_customer(state, user).await?;

    // Without a caller key, a random one-shot token still protects the
    // gateway call against transport-level retry duplication.
    let gateway_key = scoped_key
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let session = state
        .stripe
        .create_checkout_session(&CreateSessionParams {
            customer_id: &customer_id,
            user_id: &user.id,
            product_id: product.id,
            product_name: product.name,
            product_description: product.description,
            amount_cents: product.amount_cents,
            currency: &product.currency,
            success_url: &state.checkout_success_url,
            cancel_url: &state.checkout_cancel_url,
            idempotency_key: &gateway_key,
        })
        .await?;

    let checkout_url = session
        .url
        .clone()
        .ok_or_else(|| AppError::Gateway("checkout session has no URL".into()))?;

    let insert = queries::create_order(
        &conn,
        &CreateOrder {
            user_id: user.id.clone(),
            product_id: product.id.to_string(),
            product_name: product.name.to_string(),
            amount_cents: product.amount_cents,
            currency: product.currency.clone(),
            stripe_checkout_session_id: session.id.clone(),
            stripe_payment_intent_id: session.payment_intent.clone(),
            idempotency_key: scoped_key,
        },
    );

    match insert {
        Ok(order) => state.mailer.send_order_pending(user, &order).await,
        Err(AppError::Database(ref e)) if queries::is_unique_violation(e) => {
            // A concurrent request with the same idempotency key persisted
            // the order first. The gateway deduplicated the session via the
            // same key, so the pair below is the stored one.
            tracing::debug!(user_id = %user.id, "checkout idempotency race, reusing existing order");
        }
        Err(e) => return Err(e),
    }

    Ok(CheckoutSessionResponse {
        checkout_url,
        session_id: session.id,
    })
}

/// Make sure the user has a gateway customer identity, creating one lazily.
/// The persisted id is never overwritten, so repeated calls reuse it.
async fn ensure_stripe_customer(state: &AppState, user: &User) -> Result<String> {
    if let Some(ref customer_id) = user.stripe_customer_id {
        return Ok(customer_id.clone());
    }

    let customer = state
        .stripe
        .create_customer(&user.email, &user.username, &user.id)
        .await?;

    let conn = state.db.get()?;
    queries::set_stripe_customer_id(&conn, &user.id, &customer.id)?;
    Ok(customer.id)
}

/// Fire the notification matching a status transition that actually changed
/// a row. Callers gate on `transition_order_status` returning true, which is
/// what keeps webhook delivery and the reconciliation sweep from sending the
/// same mail twice.
pub async fn notify_status_change(
    state: &AppState,
    order: &ShopOrder,
    next: OrderStatus,
) -> Result<()> {
    let user = {
        let conn = state.db.get()?;
        queries::get_user_by_id(&conn, &order.user_id)?
    };
    let Some(user) = user else {
        tracing::warn!(order_id = %order.id, "order owner no longer exists, skipping notification");
        return Ok(());
    };

    match next {
        OrderStatus::Paid => state.mailer.send_order_paid(&user, order).await,
        OrderStatus::Failed => state.mailer.send_order_failed(&user, order).await,
        OrderStatus::Pending | OrderStatus::Expired => {}
    }
    Ok(())
}
