//! Stripe webhook endpoint.
//!
//! Contract: 400 when the signature header is absent or invalid, 503 when
//! the webhook secret is unconfigured, 200 otherwise - including for ignored
//! event types and already-processed duplicates.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Router;

use crate::db::AppState;
use crate::error::{msg, AppError, Result};
use crate::payments::StripeWebhookEvent;
use crate::shop;

pub fn router() -> Router<AppState> {
    Router::new().route("/shop/webhook", post(handle_stripe_webhook))
}

pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest(msg::MISSING_STRIPE_SIGNATURE.into()))?;

    if !state.stripe.verify_webhook_signature(&body, signature)? {
        return Err(AppError::BadRequest(msg::INVALID_SIGNATURE.into()));
    }

    let event: StripeWebhookEvent = serde_json::from_slice(&body)?;

    let change = {
        let mut conn = state.db.get()?;
        shop::webhook::process_event(&mut conn, &event)?
    };

    // Notify only after the transition committed, and only when it actually
    // changed a row.
    if let Some((order, next)) = change {
        shop::notify_status_change(&state, &order, next).await?;
    }

    Ok("received")
}
