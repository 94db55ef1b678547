//! Single-use purpose-scoped tokens (email verification, password reset,
//! refresh sessions).
//!
//! Only the SHA-256 hex hash of a secret is ever stored; the raw value is
//! returned to the caller once at issue time. At most one active token
//! exists per (user, purpose): issuing deletes all prior ones first.
//! Redemption is a single conditional UPDATE, so a token can be consumed
//! exactly once no matter how many callers race on it.

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};

use crate::crypto::{generate_secret, hash_secret};
use crate::db::queries;
use crate::error::Result;
use crate::models::{TokenPurpose, User};

/// Token lifetimes, in seconds, by purpose (plus the access-token TTL the
/// auth handlers hand to the signer).
#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub verification_secs: i64,
    pub reset_secs: i64,
    pub access_secs: i64,
    pub refresh_secs: i64,
}

/// Issue a fresh token for (user, purpose), invalidating any prior ones.
/// Returns the raw secret; it is never stored.
pub fn issue(
    conn: &mut Connection,
    user_id: &str,
    purpose: TokenPurpose,
    ttl_secs: i64,
) -> Result<String> {
    let raw = generate_secret();
    let token_hash = hash_secret(&raw);
    let now = Utc::now().timestamp();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    queries::delete_tokens_for_user(&tx, user_id, purpose)?;
    queries::insert_token(&tx, user_id, purpose, &token_hash, now + ttl_secs)?;
    tx.commit()?;

    Ok(raw)
}

/// Redeem a raw secret for its owning user. Fails (returns None) when the
/// token is unknown, expired, purpose-mismatched, or already used.
pub fn consume(conn: &Connection, raw: &str, purpose: TokenPurpose) -> Result<Option<User>> {
    let token_hash = hash_secret(raw);
    let now = Utc::now().timestamp();

    match queries::consume_token(conn, &token_hash, purpose, now)? {
        None => Ok(None),
        Some(user_id) => queries::get_user_by_id(conn, &user_id),
    }
}

/// Whether this raw secret is a verification token that was already
/// redeemed by a user who is now verified. Distinguishes "link already
/// clicked" from "link never existed".
pub fn is_already_redeemed(conn: &Connection, raw: &str) -> Result<bool> {
    let token_hash = hash_secret(raw);
    let Some(token) =
        queries::get_token_by_hash_and_purpose(conn, &token_hash, TokenPurpose::EmailVerification)?
    else {
        return Ok(false);
    };
    if token.used_at.is_none() {
        return Ok(false);
    }

    Ok(queries::get_user_by_id(conn, &token.user_id)?
        .map_or(false, |user| user.email_verified))
}

/// Drop all tokens for (user, purpose), e.g. after a completed password reset.
pub fn revoke_for_user(conn: &Connection, user_id: &str, purpose: TokenPurpose) -> Result<()> {
    queries::delete_tokens_for_user(conn, user_id, purpose)?;
    Ok(())
}
