//! Registration, login, refresh, email verification, and password reset.
//!
//! Every authentication attempt passes the abuse counters before any
//! credential work happens. The enumeration-sensitive endpoints
//! (resend-verification, password-reset request) answer identically whether
//! or not the account exists.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;

use crate::crypto;
use crate::db::{queries, AppState};
use crate::error::{msg, AppError, Result};
use crate::extractors::{Json, Query};
use crate::models::{
    AuthResponse, LoginRequest, PasswordResetConfirmRequest, PasswordResetRequest,
    RefreshTokenRequest, RegisterRequest, ResendVerificationRequest, TokenPurpose,
    VerifyEmailQuery,
};
use crate::security;
use crate::tokens;
use crate::util;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/verify-email", get(verify_email))
        .route("/auth/resend-verification", post(resend_verification))
        .route("/auth/password-reset/request", post(request_password_reset))
        .route("/auth/password-reset/confirm", post(confirm_password_reset))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let email = req.email.trim();
    if email.is_empty() {
        return Err(AppError::BadRequest(msg::EMAIL_REQUIRED.into()));
    }

    let mut conn = state.db.get()?;

    if queries::get_user_by_username(&conn, &req.username)?.is_some() {
        return Err(AppError::BadRequest(msg::USERNAME_TAKEN.into()));
    }
    if queries::email_exists(&conn, email)? {
        return Err(AppError::BadRequest(msg::EMAIL_TAKEN.into()));
    }

    let password_hash = crypto::hash_password(&req.password)?;
    let user = queries::create_user(&conn, &req.username, email, &password_hash)?;

    let token = tokens::issue(
        &mut conn,
        &user.id,
        TokenPurpose::EmailVerification,
        state.token_ttls.verification_secs,
    )?;
    state
        .mailer
        .send_verification_email(&user.email, &user.username, &token)
        .await;

    Ok((StatusCode::ACCEPTED, "verification_sent"))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let ip = util::resolve_client_ip(&headers, peer);
    let mut conn = state.db.get()?;

    if security::is_ip_rate_limited(&mut conn, &state.security, &ip)? {
        return Err(AppError::TooManyRequests(msg::TOO_MANY_REQUESTS.into()));
    }
    if security::is_credential_locked(&mut conn, &req.username, &ip)? {
        return Err(AppError::TooManyRequests(
            msg::TOO_MANY_FAILED_ATTEMPTS.into(),
        ));
    }

    let Some(user) = queries::get_user_by_username(&conn, &req.username)? else {
        security::record_auth_failure(&mut conn, &state.security, &req.username, &ip)?;
        return Err(AppError::Unauthorized);
    };

    if !user.email_verified {
        return Err(AppError::Forbidden(msg::EMAIL_NOT_VERIFIED.into()));
    }

    if !crypto::verify_password(&req.password, &user.password_hash) {
        security::record_auth_failure(&mut conn, &state.security, &req.username, &ip)?;
        return Err(AppError::Unauthorized);
    }

    security::record_auth_success(&conn, &req.username, &ip)?;

    let access_token = state
        .signer
        .mint(&user.username, state.token_ttls.access_secs as u64)?;
    let refresh_token = tokens::issue(
        &mut conn,
        &user.id,
        TokenPurpose::RefreshSession,
        state.token_ttls.refresh_secs,
    )?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in_secs: state.token_ttls.access_secs,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<AuthResponse>> {
    let mut conn = state.db.get()?;

    let Some(user) = tokens::consume(&conn, &req.refresh_token, TokenPurpose::RefreshSession)?
    else {
        return Err(AppError::Unauthorized);
    };

    let access_token = state
        .signer
        .mint(&user.username, state.token_ttls.access_secs as u64)?;
    // Rotation: the consumed token is spent, a fresh one replaces it.
    let refresh_token = tokens::issue(
        &mut conn,
        &user.id,
        TokenPurpose::RefreshSession,
        state.token_ttls.refresh_secs,
    )?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in_secs: state.token_ttls.access_secs,
    }))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<&'static str> {
    let conn = state.db.get()?;

    match tokens::consume(&conn, &query.token, TokenPurpose::EmailVerification)? {
        Some(user) => {
            queries::mark_email_verified(&conn, &user.id)?;
            Ok("email_verified")
        }
        None => {
            // "Link already clicked" reads as success; "link never existed"
            // does not.
            if tokens::is_already_redeemed(&conn, &query.token)? {
                Ok("email_verified")
            } else {
                Err(AppError::BadRequest(msg::INVALID_OR_EXPIRED_TOKEN.into()))
            }
        }
    }
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<&'static str> {
    let mut conn = state.db.get()?;

    if let Some(user) = queries::get_user_by_email(&conn, &req.email)? {
        if !user.email_verified {
            let token = tokens::issue(
                &mut conn,
                &user.id,
                TokenPurpose::EmailVerification,
                state.token_ttls.verification_secs,
            )?;
            state
                .mailer
                .send_verification_email(&user.email, &user.username, &token)
                .await;
        }
    }

    Ok("verification_if_exists")
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<&'static str> {
    let mut conn = state.db.get()?;

    if let Some(user) = queries::get_user_by_email(&conn, &req.email)? {
        let token = tokens::issue(
            &mut conn,
            &user.id,
            TokenPurpose::PasswordReset,
            state.token_ttls.reset_secs,
        )?;
        state
            .mailer
            .send_password_reset_email(&user.email, &user.username, &token)
            .await;
    }

    Ok("password_reset_if_exists")
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirmRequest>,
) -> Result<&'static str> {
    let conn = state.db.get()?;

    let Some(user) = tokens::consume(&conn, &req.token, TokenPurpose::PasswordReset)? else {
        return Err(AppError::BadRequest(msg::INVALID_OR_EXPIRED_TOKEN.into()));
    };

    let password_hash = crypto::hash_password(&req.new_password)?;
    queries::set_password_hash(&conn, &user.id, &password_hash)?;
    tokens::revoke_for_user(&conn, &user.id, TokenPurpose::PasswordReset)?;

    Ok("password_reset_success")
}
