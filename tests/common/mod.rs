//! Test utilities and fixtures for storefront integration tests

#![allow(dead_code)]

use rusqlite::Connection;

pub use storefront::db::{init_db, queries};
pub use storefront::models::*;
pub use storefront::security::SecurityPolicy;

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create a test user. The password hash is a placeholder; tests that
/// exercise credentials go through `crypto::hash_password` themselves.
pub fn create_test_user(conn: &Connection, username: &str) -> User {
    queries::create_user(
        conn,
        username,
        &format!("{}@example.com", username),
        "$argon2-test-placeholder",
    )
    .expect("Failed to create test user")
}

/// Create a PENDING order for a user with the given gateway session id.
pub fn create_pending_order(conn: &Connection, user: &User, session_id: &str) -> ShopOrder {
    queries::create_order(
        conn,
        &CreateOrder {
            user_id: user.id.clone(),
            product_id: "starter-pack".to_string(),
            product_name: "Starter Pack".to_string(),
            amount_cents: 1900,
            currency: "usd".to_string(),
            stripe_checkout_session_id: session_id.to_string(),
            stripe_payment_intent_id: None,
            idempotency_key: None,
        },
    )
    .expect("Failed to create test order")
}

/// Default security policy used across tests (60 rpm, 5 failures, 15 min lock).
pub fn test_policy() -> SecurityPolicy {
    SecurityPolicy::default()
}
