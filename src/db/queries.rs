use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{
    query_all, query_one, BUCKET_COLS, EVENT_COLS, LOCK_COLS, ORDER_COLS, TOKEN_COLS, USER_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Whether a rusqlite error is a uniqueness/primary-key violation.
/// Used to detect concurrent first-writer races that should be retried
/// (or, for processed events, swallowed as "already handled").
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation)
}

// ============ Users ============

pub fn create_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<User> {
    let id = gen_id();
    let now = now();
    let email = email.trim().to_lowercase();

    conn.execute(
        "INSERT INTO users (id, username, email, password_hash, email_verified, stripe_customer_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, ?5)",
        params![&id, username, &email, password_hash, now],
    )?;

    Ok(User {
        id,
        username: username.to_string(),
        email,
        password_hash: password_hash.to_string(),
        email_verified: false,
        stripe_customer_id: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE username = ?1", USER_COLS),
        &[&username],
    )
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = email.trim().to_lowercase();
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLS),
        &[&email],
    )
}

pub fn email_exists(conn: &Connection, email: &str) -> Result<bool> {
    let email = email.trim().to_lowercase();
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE email = ?1",
            params![&email],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

/// Persist a lazily created gateway customer id on the user.
/// Idempotent: an already-set id is never overwritten.
pub fn set_stripe_customer_id(conn: &Connection, user_id: &str, customer_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE users SET stripe_customer_id = ?2, updated_at = ?3
         WHERE id = ?1 AND stripe_customer_id IS NULL",
        params![user_id, customer_id, now()],
    )?;
    Ok(())
}

pub fn mark_email_verified(conn: &Connection, user_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE users SET email_verified = 1, updated_at = ?2 WHERE id = ?1",
        params![user_id, now()],
    )?;
    Ok(())
}

pub fn set_password_hash(conn: &Connection, user_id: &str, password_hash: &str) -> Result<()> {
    conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
        params![user_id, password_hash, now()],
    )?;
    Ok(())
}

// ============ Orders ============

pub fn create_order(conn: &Connection, input: &CreateOrder) -> Result<ShopOrder> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO shop_orders (id, user_id, product_id, product_name, amount_cents, currency, status, stripe_checkout_session_id, stripe_payment_intent_id, idempotency_key, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING', ?7, ?8, ?9, ?10, ?10)",
        params![
            &id,
            &input.user_id,
            &input.product_id,
            &input.product_name,
            input.amount_cents,
            &input.currency,
            &input.stripe_checkout_session_id,
            &input.stripe_payment_intent_id,
            &input.idempotency_key,
            now
        ],
    )?;

    Ok(ShopOrder {
        id,
        user_id: input.user_id.clone(),
        product_id: input.product_id.clone(),
        product_name: input.product_name.clone(),
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        status: OrderStatus::Pending,
        stripe_checkout_session_id: input.stripe_checkout_session_id.clone(),
        stripe_payment_intent_id: input.stripe_payment_intent_id.clone(),
        idempotency_key: input.idempotency_key.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_order_by_user_and_key(
    conn: &Connection,
    user_id: &str,
    idempotency_key: &str,
) -> Result<Option<ShopOrder>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM shop_orders WHERE user_id = ?1 AND idempotency_key = ?2",
            ORDER_COLS
        ),
        &[&user_id, &idempotency_key],
    )
}

pub fn get_order_by_session_id(conn: &Connection, session_id: &str) -> Result<Option<ShopOrder>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM shop_orders WHERE stripe_checkout_session_id = ?1",
            ORDER_COLS
        ),
        &[&session_id],
    )
}

pub fn get_order_by_payment_intent_id(
    conn: &Connection,
    payment_intent_id: &str,
) -> Result<Option<ShopOrder>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM shop_orders WHERE stripe_payment_intent_id = ?1",
            ORDER_COLS
        ),
        &[&payment_intent_id],
    )
}

pub fn list_orders_for_user(conn: &Connection, user_id: &str) -> Result<Vec<ShopOrder>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM shop_orders WHERE user_id = ?1 ORDER BY created_at DESC",
            ORDER_COLS
        ),
        &[&user_id],
    )
}

/// Oldest-updated-first so no single stuck order can starve the sweep.
pub fn list_pending_orders(conn: &Connection, limit: i64) -> Result<Vec<ShopOrder>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM shop_orders WHERE status = 'PENDING' ORDER BY updated_at ASC LIMIT ?1",
            ORDER_COLS
        ),
        &[&limit],
    )
}

/// Conditionally transition an order out of PENDING.
///
/// Returns true only when a row actually changed, which is the caller's
/// signal to fire the corresponding notification. Orders already in a
/// terminal status are untouched, so the webhook processor and the
/// reconciliation sweep cannot double-apply the same transition. The
/// payment-intent id is captured when newly known and never cleared.
pub fn transition_order_status(
    conn: &Connection,
    order_id: &str,
    next: OrderStatus,
    payment_intent_id: Option<&str>,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE shop_orders
            SET status = ?2,
                stripe_payment_intent_id = COALESCE(?3, stripe_payment_intent_id),
                updated_at = ?4
          WHERE id = ?1 AND status = 'PENDING'",
        params![order_id, next.as_str(), payment_intent_id, now()],
    )?;
    Ok(affected > 0)
}

// ============ Processed webhook events ============

pub fn processed_event_exists(conn: &Connection, event_id: &str) -> Result<bool> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM processed_stripe_events WHERE event_id = ?1",
            params![event_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

pub fn get_processed_event(
    conn: &Connection,
    event_id: &str,
) -> Result<Option<ProcessedStripeEvent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM processed_stripe_events WHERE event_id = ?1",
            EVENT_COLS
        ),
        &[&event_id],
    )
}

/// Record an event as handled. Callers catch the uniqueness violation from
/// a concurrent duplicate delivery and treat it as "already processed".
pub fn record_processed_event(
    conn: &Connection,
    event_id: &str,
    event_type: &str,
) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO processed_stripe_events (event_id, event_type, processed_at)
         VALUES (?1, ?2, ?3)",
        params![event_id, event_type, now()],
    )?;
    Ok(())
}

// ============ Rate limit buckets ============

pub fn get_rate_limit_bucket(conn: &Connection, ip: &str) -> Result<Option<RateLimitBucket>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM auth_rate_limit_buckets WHERE ip_address = ?1",
            BUCKET_COLS
        ),
        &[&ip],
    )
}

pub fn insert_rate_limit_bucket(
    conn: &Connection,
    ip: &str,
    window_start: i64,
    request_count: i64,
) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO auth_rate_limit_buckets (ip_address, window_start, request_count)
         VALUES (?1, ?2, ?3)",
        params![ip, window_start, request_count],
    )?;
    Ok(())
}

pub fn update_rate_limit_bucket(
    conn: &Connection,
    ip: &str,
    window_start: i64,
    request_count: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE auth_rate_limit_buckets SET window_start = ?2, request_count = ?3
         WHERE ip_address = ?1",
        params![ip, window_start, request_count],
    )?;
    Ok(())
}

// ============ Login locks ============

pub fn get_login_lock(conn: &Connection, lock_key: &str) -> Result<Option<LoginLock>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM auth_login_locks WHERE lock_key = ?1",
            LOCK_COLS
        ),
        &[&lock_key],
    )
}

pub fn insert_login_lock(
    conn: &Connection,
    lock: &LoginLock,
) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO auth_login_locks (lock_key, window_start, failure_count, locked_until)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            &lock.lock_key,
            lock.window_start,
            lock.failure_count,
            lock.locked_until
        ],
    )?;
    Ok(())
}

pub fn update_login_lock(conn: &Connection, lock: &LoginLock) -> Result<()> {
    conn.execute(
        "UPDATE auth_login_locks SET window_start = ?2, failure_count = ?3, locked_until = ?4
         WHERE lock_key = ?1",
        params![
            &lock.lock_key,
            lock.window_start,
            lock.failure_count,
            lock.locked_until
        ],
    )?;
    Ok(())
}

pub fn delete_login_lock(conn: &Connection, lock_key: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM auth_login_locks WHERE lock_key = ?1",
        params![lock_key],
    )?;
    Ok(())
}

// ============ Single-use tokens ============

pub fn delete_tokens_for_user(
    conn: &Connection,
    user_id: &str,
    purpose: TokenPurpose,
) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM user_tokens WHERE user_id = ?1 AND purpose = ?2",
        params![user_id, purpose.as_str()],
    )?;
    Ok(deleted)
}

pub fn insert_token(
    conn: &Connection,
    user_id: &str,
    purpose: TokenPurpose,
    token_hash: &str,
    expires_at: i64,
) -> Result<UserToken> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO user_tokens (id, user_id, purpose, token_hash, created_at, expires_at, used_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
        params![&id, user_id, purpose.as_str(), token_hash, now, expires_at],
    )?;

    Ok(UserToken {
        id,
        user_id: user_id.to_string(),
        purpose,
        token_hash: token_hash.to_string(),
        created_at: now,
        expires_at,
        used_at: None,
    })
}

/// Atomically redeem an unused, unexpired token. The single conditional
/// UPDATE guarantees exactly-once semantics under concurrent redemption.
/// Returns the owning user id when this call won the redemption.
pub fn consume_token(
    conn: &Connection,
    token_hash: &str,
    purpose: TokenPurpose,
    now: i64,
) -> Result<Option<String>> {
    conn.query_row(
        "UPDATE user_tokens SET used_at = ?3
          WHERE token_hash = ?1 AND purpose = ?2 AND used_at IS NULL AND expires_at > ?3
          RETURNING user_id",
        params![token_hash, purpose.as_str(), now],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

pub fn get_token_by_hash_and_purpose(
    conn: &Connection,
    token_hash: &str,
    purpose: TokenPurpose,
) -> Result<Option<UserToken>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM user_tokens WHERE token_hash = ?1 AND purpose = ?2",
            TOKEN_COLS
        ),
        &[&token_hash, &purpose.as_str()],
    )
}
