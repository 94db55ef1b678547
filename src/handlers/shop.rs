//! Shop endpoints: catalog, checkout-session creation, and order history.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::{
    CheckoutSessionResponse, CreateCheckoutSessionRequest, ShopOrder, ShopProduct, User,
};
use crate::shop;
use crate::util;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shop/products", get(products))
        .route("/shop/checkout-session", post(create_checkout_session))
        .route("/shop/orders", get(orders))
}

/// Resolve the authenticated user from the Bearer access token.
fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let token = util::extract_bearer_token(headers).ok_or(AppError::Unauthorized)?;
    let username = state.signer.verify(token)?;
    let conn = state.db.get()?;
    queries::get_user_by_username(&conn, &username)?.ok_or(AppError::Unauthorized)
}

pub async fn products(State(state): State<AppState>) -> Json<Vec<ShopProduct>> {
    Json(shop::catalog(&state.currency))
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateCheckoutSessionRequest>,
) -> Result<Json<CheckoutSessionResponse>> {
    let user = require_user(&state, &headers)?;
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok());

    let response =
        shop::create_checkout_session(&state, &user, &req.product_id, idempotency_key).await?;
    Ok(Json(response))
}

pub async fn orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ShopOrder>>> {
    let user = require_user(&state, &headers)?;
    let conn = state.db.get()?;
    let orders = queries::list_orders_for_user(&conn, &user.id)?;
    Ok(Json(orders))
}
