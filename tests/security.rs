//! Rate limiter and brute-force lockout tests.
//!
//! Both counters live in the store, so window arithmetic is tested by
//! rewinding the persisted timestamps rather than by sleeping.

mod common;

use common::*;
use rusqlite::params;
use storefront::security;

// ============ Rate limiter ============

#[test]
fn test_rate_limit_allows_up_to_ceiling() {
    let mut conn = setup_test_db();
    let policy = test_policy();

    for i in 1..=60 {
        let limited = security::is_ip_rate_limited(&mut conn, &policy, "203.0.113.7")
            .expect("rate limit check should not error");
        assert!(!limited, "request {} should pass", i);
    }

    let limited = security::is_ip_rate_limited(&mut conn, &policy, "203.0.113.7").unwrap();
    assert!(limited, "61st request within the window should be rejected");
}

#[test]
fn test_rate_limit_window_reset() {
    let mut conn = setup_test_db();
    let policy = test_policy();

    for _ in 0..61 {
        security::is_ip_rate_limited(&mut conn, &policy, "203.0.113.7").unwrap();
    }
    assert!(security::is_ip_rate_limited(&mut conn, &policy, "203.0.113.7").unwrap());

    // Rewind the window past the 60-second boundary
    let rewound = chrono::Utc::now().timestamp() - 61;
    conn.execute(
        "UPDATE auth_rate_limit_buckets SET window_start = ?1 WHERE ip_address = ?2",
        params![rewound, "203.0.113.7"],
    )
    .unwrap();

    let limited = security::is_ip_rate_limited(&mut conn, &policy, "203.0.113.7").unwrap();
    assert!(!limited, "a request after the window elapsed should pass again");

    // And the bucket restarted counting from this request
    let bucket = queries::get_rate_limit_bucket(&conn, "203.0.113.7")
        .unwrap()
        .expect("bucket should exist");
    assert_eq!(bucket.request_count, 1);
}

#[test]
fn test_rate_limit_buckets_are_per_ip() {
    let mut conn = setup_test_db();
    let policy = SecurityPolicy {
        max_requests_per_minute: 2,
        ..test_policy()
    };

    security::is_ip_rate_limited(&mut conn, &policy, "198.51.100.1").unwrap();
    security::is_ip_rate_limited(&mut conn, &policy, "198.51.100.1").unwrap();
    assert!(security::is_ip_rate_limited(&mut conn, &policy, "198.51.100.1").unwrap());

    // A different IP has its own bucket
    assert!(!security::is_ip_rate_limited(&mut conn, &policy, "198.51.100.2").unwrap());
}

// ============ Brute-force lockout ============

#[test]
fn test_lockout_after_threshold_failures() {
    let mut conn = setup_test_db();
    let policy = test_policy();

    for i in 1..=4 {
        security::record_auth_failure(&mut conn, &policy, "alice", "203.0.113.7").unwrap();
        assert!(
            !security::is_credential_locked(&mut conn, "alice", "203.0.113.7").unwrap(),
            "not locked after {} failures",
            i
        );
    }

    // Fifth failure crosses the threshold
    security::record_auth_failure(&mut conn, &policy, "alice", "203.0.113.7").unwrap();
    assert!(security::is_credential_locked(&mut conn, "alice", "203.0.113.7").unwrap());

    // The lockout starts from a clean count
    let lock = queries::get_login_lock(&conn, "alice|203.0.113.7")
        .unwrap()
        .expect("lock row should exist");
    assert_eq!(lock.failure_count, 0);
    assert!(lock.locked_until.is_some());
}

#[test]
fn test_lock_is_scoped_to_username_ip_pair() {
    let mut conn = setup_test_db();
    let policy = test_policy();

    for _ in 0..5 {
        security::record_auth_failure(&mut conn, &policy, "alice", "203.0.113.7").unwrap();
    }
    assert!(security::is_credential_locked(&mut conn, "alice", "203.0.113.7").unwrap());

    // Same user from another IP, and another user from the same IP, are fine
    assert!(!security::is_credential_locked(&mut conn, "alice", "203.0.113.8").unwrap());
    assert!(!security::is_credential_locked(&mut conn, "bob", "203.0.113.7").unwrap());
}

#[test]
fn test_failures_while_locked_do_not_extend_lock() {
    let mut conn = setup_test_db();
    let policy = test_policy();

    for _ in 0..5 {
        security::record_auth_failure(&mut conn, &policy, "alice", "203.0.113.7").unwrap();
    }
    let before = queries::get_login_lock(&conn, "alice|203.0.113.7")
        .unwrap()
        .unwrap();

    // More failures during the active lock are no-ops
    security::record_auth_failure(&mut conn, &policy, "alice", "203.0.113.7").unwrap();
    security::record_auth_failure(&mut conn, &policy, "alice", "203.0.113.7").unwrap();

    let after = queries::get_login_lock(&conn, "alice|203.0.113.7")
        .unwrap()
        .unwrap();
    assert_eq!(after.locked_until, before.locked_until);
    assert_eq!(after.failure_count, 0);
}

#[test]
fn test_expired_lock_is_cleared_by_check() {
    let mut conn = setup_test_db();
    let policy = test_policy();

    for _ in 0..5 {
        security::record_auth_failure(&mut conn, &policy, "alice", "203.0.113.7").unwrap();
    }

    // Rewind the lock expiry into the past
    let expired = chrono::Utc::now().timestamp() - 1;
    conn.execute(
        "UPDATE auth_login_locks SET locked_until = ?1 WHERE lock_key = ?2",
        params![expired, "alice|203.0.113.7"],
    )
    .unwrap();

    assert!(!security::is_credential_locked(&mut conn, "alice", "203.0.113.7").unwrap());

    // The check cleared the lock rather than merely ignoring it
    let lock = queries::get_login_lock(&conn, "alice|203.0.113.7")
        .unwrap()
        .unwrap();
    assert!(lock.locked_until.is_none());
    assert_eq!(lock.failure_count, 0);
}

#[test]
fn test_failure_window_reset_after_inactivity() {
    let mut conn = setup_test_db();
    let policy = test_policy();

    for _ in 0..4 {
        security::record_auth_failure(&mut conn, &policy, "alice", "203.0.113.7").unwrap();
    }

    // 15 minutes of inactivity elapse
    let stale = chrono::Utc::now().timestamp() - (15 * 60 + 1);
    conn.execute(
        "UPDATE auth_login_locks SET window_start = ?1 WHERE lock_key = ?2",
        params![stale, "alice|203.0.113.7"],
    )
    .unwrap();

    // This failure starts a fresh window instead of being the fifth
    security::record_auth_failure(&mut conn, &policy, "alice", "203.0.113.7").unwrap();

    let lock = queries::get_login_lock(&conn, "alice|203.0.113.7")
        .unwrap()
        .unwrap();
    assert_eq!(lock.failure_count, 1);
    assert!(lock.locked_until.is_none());
    assert!(!security::is_credential_locked(&mut conn, "alice", "203.0.113.7").unwrap());
}

#[test]
fn test_success_deletes_lock_row() {
    let mut conn = setup_test_db();
    let policy = test_policy();

    for _ in 0..3 {
        security::record_auth_failure(&mut conn, &policy, "alice", "203.0.113.7").unwrap();
    }
    assert!(queries::get_login_lock(&conn, "alice|203.0.113.7")
        .unwrap()
        .is_some());

    security::record_auth_success(&conn, "alice", "203.0.113.7").unwrap();

    assert!(
        queries::get_login_lock(&conn, "alice|203.0.113.7")
            .unwrap()
            .is_none(),
        "success should clear all failure history for the pair"
    );
}
