//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupted data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str =
    "id, username, email, password_hash, email_verified, stripe_customer_id, created_at, updated_at";

pub const ORDER_COLS: &str = "id, user_id, product_id, product_name, amount_cents, currency, status, stripe_checkout_session_id, stripe_payment_intent_id, idempotency_key, created_at, updated_at";

pub const TOKEN_COLS: &str =
    "id, user_id, purpose, token_hash, created_at, expires_at, used_at";

pub const EVENT_COLS: &str = "event_id, event_type, processed_at";

pub const BUCKET_COLS: &str = "ip_address, window_start, request_count";

pub const LOCK_COLS: &str = "lock_key, window_start, failure_count, locked_until";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            email_verified: row.get::<_, i64>(4)? != 0,
            stripe_customer_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for ShopOrder {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ShopOrder {
            id: row.get(0)?,
            user_id: row.get(1)?,
            product_id: row.get(2)?,
            product_name: row.get(3)?,
            amount_cents: row.get(4)?,
            currency: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            stripe_checkout_session_id: row.get(7)?,
            stripe_payment_intent_id: row.get(8)?,
            idempotency_key: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

impl FromRow for UserToken {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(UserToken {
            id: row.get(0)?,
            user_id: row.get(1)?,
            purpose: parse_enum(row, 2, "purpose")?,
            token_hash: row.get(3)?,
            created_at: row.get(4)?,
            expires_at: row.get(5)?,
            used_at: row.get(6)?,
        })
    }
}

impl FromRow for ProcessedStripeEvent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ProcessedStripeEvent {
            event_id: row.get(0)?,
            event_type: row.get(1)?,
            processed_at: row.get(2)?,
        })
    }
}

impl FromRow for RateLimitBucket {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(RateLimitBucket {
            ip_address: row.get(0)?,
            window_start: row.get(1)?,
            request_count: row.get(2)?,
        })
    }
}

impl FromRow for LoginLock {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(LoginLock {
            lock_key: row.get(0)?,
            window_start: row.get(1)?,
            failure_count: row.get(2)?,
            locked_until: row.get(3)?,
        })
    }
}
