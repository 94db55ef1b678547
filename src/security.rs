//! Abuse counters for the authentication surface.
//!
//! Two persisted policies run before any credential check:
//! - a per-IP request counter over a 1-minute fixed window, and
//! - a brute-force lockout keyed by `username + "|" + ip` over a 15-minute
//!   failure window.
//!
//! Both are plain read-modify-write sequences executed inside an IMMEDIATE
//! transaction so concurrent traffic cannot lose updates or double-count.
//! When two requests race to create the same row for the first time, the
//! loser's uniqueness violation retries the whole operation, bounded at
//! `CONFLICT_RETRIES` attempts.

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::LoginLock;

pub const RATE_WINDOW_SECS: i64 = 60;
pub const FAILURE_WINDOW_SECS: i64 = 15 * 60;

/// Bounded retries for first-insert uniqueness races. Past the bound the
/// conflict surfaces to the caller as transient.
const CONFLICT_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct SecurityPolicy {
    pub max_requests_per_minute: i64,
    pub max_failures: i64,
    pub lock_duration_secs: i64,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
            max_failures: 5,
            lock_duration_secs: 15 * 60,
        }
    }
}

fn lock_key(username: &str, ip: &str) -> String {
    format!("{}|{}", username, ip)
}

fn is_retryable(err: &AppError) -> bool {
    matches!(err, AppError::Database(e) if queries::is_unique_violation(e))
}

/// Count one request from `ip` and report whether it exceeded the ceiling.
///
/// The window reset and the increment happen in one transaction; the
/// post-increment count decides the verdict, so the request that crosses
/// the ceiling is itself rejected.
pub fn is_ip_rate_limited(
    conn: &mut Connection,
    policy: &SecurityPolicy,
    ip: &str,
) -> Result<bool> {
    for _ in 0..CONFLICT_RETRIES {
        match count_request(conn, policy, ip) {
            Err(e) if is_retryable(&e) => continue,
            other => return other,
        }
    }
    Err(AppError::Conflict(
        "rate limit bucket contention, retries exhausted".into(),
    ))
}

fn count_request(conn: &mut Connection, policy: &SecurityPolicy, ip: &str) -> Result<bool> {
    let now = Utc::now().timestamp();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let count = match queries::get_rate_limit_bucket(&tx, ip)? {
        None => {
            queries::insert_rate_limit_bucket(&tx, ip, now, 1)?;
            1
        }
        Some(mut bucket) => {
            if now > bucket.window_start + RATE_WINDOW_SECS {
                bucket.window_start = now;
                bucket.request_count = 0;
            }
            bucket.request_count += 1;
            queries::update_rate_limit_bucket(&tx, ip, bucket.window_start, bucket.request_count)?;
            bucket.request_count
        }
    };

    tx.commit()?;
    Ok(count > policy.max_requests_per_minute)
}

/// Whether the username+IP pair is currently locked out.
///
/// A lock whose `locked_until` has passed is cleared here (counter and
/// window reset), not merely ignored, so the next failure starts fresh.
pub fn is_credential_locked(conn: &mut Connection, username: &str, ip: &str) -> Result<bool> {
    let key = lock_key(username, ip);
    let now = Utc::now().timestamp();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(lock) = queries::get_login_lock(&tx, &key)? else {
        return Ok(false);
    };
    let Some(locked_until) = lock.locked_until else {
        return Ok(false);
    };

    if now > locked_until {
        queries::update_login_lock(
            &tx,
            &LoginLock {
                lock_key: key,
                window_start: now,
                failure_count: 0,
                locked_until: None,
            },
        )?;
        tx.commit()?;
        return Ok(false);
    }

    Ok(true)
}

/// Record one failed authentication attempt for the username+IP pair.
pub fn record_auth_failure(
    conn: &mut Connection,
    policy: &SecurityPolicy,
    username: &str,
    ip: &str,
) -> Result<()> {
    for _ in 0..CONFLICT_RETRIES {
        match count_failure(conn, policy, username, ip) {
            Err(e) if is_retryable(&e) => continue,
            other => return other,
        }
    }
    Err(AppError::Conflict(
        "login lock contention, retries exhausted".into(),
    ))
}

fn count_failure(
    conn: &mut Connection,
    policy: &SecurityPolicy,
    username: &str,
    ip: &str,
) -> Result<()> {
    let key = lock_key(username, ip);
    let now = Utc::now().timestamp();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing = queries::get_login_lock(&tx, &key)?;
    let is_new = existing.is_none();
    let mut lock = existing.unwrap_or(LoginLock {
        lock_key: key,
        window_start: now,
        failure_count: 0,
        locked_until: None,
    });

    // An active lock is neither extended nor recounted.
    if lock.locked_until.is_some_and(|until| now < until) {
        return Ok(());
    }

    if now > lock.window_start + FAILURE_WINDOW_SECS {
        lock.window_start = now;
        lock.failure_count = 0;
        lock.locked_until = None;
    }

    lock.failure_count += 1;
    if lock.failure_count >= policy.max_failures {
        lock.locked_until = Some(now + policy.lock_duration_secs);
        // A fresh lockout always starts from a clean count.
        lock.failure_count = 0;
    }

    if is_new {
        queries::insert_login_lock(&tx, &lock)?;
    } else {
        queries::update_login_lock(&tx, &lock)?;
    }

    tx.commit()?;
    Ok(())
}

/// A successful authentication clears all failure history for the pair.
pub fn record_auth_success(conn: &Connection, username: &str, ip: &str) -> Result<()> {
    queries::delete_login_lock(conn, &lock_key(username, ip))
}
