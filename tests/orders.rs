//! Order ledger tests: per-user idempotency-key uniqueness and the
//! conditional status transition that keeps terminal states monotone.

mod common;

use common::*;
use rusqlite::params;
use storefront::db::queries::is_unique_violation;

fn order_input(user: &User, session_id: &str, key: Option<&str>) -> CreateOrder {
    CreateOrder {
        user_id: user.id.clone(),
        product_id: "pro-pack".to_string(),
        product_name: "Pro Pack".to_string(),
        amount_cents: 4900,
        currency: "usd".to_string(),
        stripe_checkout_session_id: session_id.to_string(),
        stripe_payment_intent_id: None,
        idempotency_key: key.map(String::from),
    }
}

#[test]
fn test_create_and_lookup_order() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let order = queries::create_order(&conn, &order_input(&user, "cs_1", None)).unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    let by_session = queries::get_order_by_session_id(&conn, "cs_1")
        .unwrap()
        .expect("lookup by session id");
    assert_eq!(by_session.id, order.id);
    assert_eq!(by_session.amount_cents, 4900);
}

#[test]
fn test_idempotency_key_unique_per_user() {
    let conn = setup_test_db();
    let alice = create_test_user(&conn, "alice");
    let bob = create_test_user(&conn, "bob");

    let key = "checkout:shared:abc";
    queries::create_order(&conn, &order_input(&alice, "cs_1", Some(key))).unwrap();

    // Same user + same key is rejected by the store itself
    let err = queries::create_order(&conn, &order_input(&alice, "cs_2", Some(key)))
        .expect_err("duplicate key for the same user must fail");
    match err {
        storefront::error::AppError::Database(ref e) => assert!(is_unique_violation(e)),
        other => panic!("expected a database uniqueness error, got {:?}", other),
    }

    // A different user may reuse the key
    queries::create_order(&conn, &order_input(&bob, "cs_3", Some(key)))
        .expect("same key for another user is fine");

    // And key-less orders never collide
    queries::create_order(&conn, &order_input(&alice, "cs_4", None)).unwrap();
    queries::create_order(&conn, &order_input(&alice, "cs_5", None)).unwrap();
}

#[test]
fn test_lookup_by_user_and_key() {
    let conn = setup_test_db();
    let alice = create_test_user(&conn, "alice");
    let bob = create_test_user(&conn, "bob");

    let key = "checkout:k1";
    let order = queries::create_order(&conn, &order_input(&alice, "cs_1", Some(key))).unwrap();

    let found = queries::get_order_by_user_and_key(&conn, &alice.id, key)
        .unwrap()
        .expect("alice's order should be found");
    assert_eq!(found.id, order.id);

    // The key is scoped: bob sees nothing under it
    assert!(queries::get_order_by_user_and_key(&conn, &bob.id, key)
        .unwrap()
        .is_none());
}

#[test]
fn test_transition_is_terminal_once() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "alice");
    let order = create_pending_order(&conn, &user, "cs_1");

    // PENDING -> PAID changes a row
    assert!(queries::transition_order_status(&conn, &order.id, OrderStatus::Paid, None).unwrap());

    // Repeating the same transition is a no-op
    assert!(!queries::transition_order_status(&conn, &order.id, OrderStatus::Paid, None).unwrap());

    // And a terminal order never transitions to a different status
    assert!(
        !queries::transition_order_status(&conn, &order.id, OrderStatus::Expired, None).unwrap()
    );
    let current = queries::get_order_by_session_id(&conn, "cs_1")
        .unwrap()
        .unwrap();
    assert_eq!(current.status, OrderStatus::Paid);
}

#[test]
fn test_transition_captures_payment_intent_once_known() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "alice");
    let order = create_pending_order(&conn, &user, "cs_1");

    assert!(
        queries::transition_order_status(&conn, &order.id, OrderStatus::Paid, Some("pi_123"))
            .unwrap()
    );

    let current = queries::get_order_by_session_id(&conn, "cs_1")
        .unwrap()
        .unwrap();
    assert_eq!(current.stripe_payment_intent_id.as_deref(), Some("pi_123"));
    assert!(queries::get_order_by_payment_intent_id(&conn, "pi_123")
        .unwrap()
        .is_some());
}

#[test]
fn test_transition_keeps_existing_payment_intent() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let mut input = order_input(&user, "cs_1", None);
    input.stripe_payment_intent_id = Some("pi_known".to_string());
    let order = queries::create_order(&conn, &input).unwrap();

    // A transition without intent information must not erase the stored id
    assert!(queries::transition_order_status(&conn, &order.id, OrderStatus::Failed, None).unwrap());

    let current = queries::get_order_by_session_id(&conn, "cs_1")
        .unwrap()
        .unwrap();
    assert_eq!(current.stripe_payment_intent_id.as_deref(), Some("pi_known"));
}

#[test]
fn test_list_pending_orders_oldest_updated_first() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let a = create_pending_order(&conn, &user, "cs_a");
    let b = create_pending_order(&conn, &user, "cs_b");
    let c = create_pending_order(&conn, &user, "cs_c");

    // c is the stalest, a the freshest
    conn.execute(
        "UPDATE shop_orders SET updated_at = ?1 WHERE id = ?2",
        params![1000, &c.id],
    )
    .unwrap();
    conn.execute(
        "UPDATE shop_orders SET updated_at = ?1 WHERE id = ?2",
        params![2000, &b.id],
    )
    .unwrap();
    conn.execute(
        "UPDATE shop_orders SET updated_at = ?1 WHERE id = ?2",
        params![3000, &a.id],
    )
    .unwrap();

    let pending = queries::list_pending_orders(&conn, 100).unwrap();
    let ids: Vec<&str> = pending.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec![c.id.as_str(), b.id.as_str(), a.id.as_str()]);

    // The batch bound is respected
    let limited = queries::list_pending_orders(&conn, 2).unwrap();
    assert_eq!(limited.len(), 2);

    // Terminal orders drop out of the sweep set
    queries::transition_order_status(&conn, &c.id, OrderStatus::Paid, None).unwrap();
    let pending = queries::list_pending_orders(&conn, 100).unwrap();
    assert!(pending.iter().all(|o| o.id != c.id));
}

#[test]
fn test_list_orders_for_user_newest_first() {
    let conn = setup_test_db();
    let alice = create_test_user(&conn, "alice");
    let bob = create_test_user(&conn, "bob");

    let a = create_pending_order(&conn, &alice, "cs_a");
    let b = create_pending_order(&conn, &alice, "cs_b");
    create_pending_order(&conn, &bob, "cs_bob");

    conn.execute(
        "UPDATE shop_orders SET created_at = ?1 WHERE id = ?2",
        params![1000, &a.id],
    )
    .unwrap();
    conn.execute(
        "UPDATE shop_orders SET created_at = ?1 WHERE id = ?2",
        params![2000, &b.id],
    )
    .unwrap();

    let orders = queries::list_orders_for_user(&conn, &alice.id).unwrap();
    assert_eq!(orders.len(), 2, "only alice's orders are listed");
    assert_eq!(orders[0].id, b.id);
    assert_eq!(orders[1].id, a.id);
}

#[test]
fn test_set_stripe_customer_id_is_idempotent() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    queries::set_stripe_customer_id(&conn, &user.id, "cus_first").unwrap();
    // A second write must not overwrite the persisted identity
    queries::set_stripe_customer_id(&conn, &user.id, "cus_second").unwrap();

    let current = queries::get_user_by_id(&conn, &user.id).unwrap().unwrap();
    assert_eq!(current.stripe_customer_id.as_deref(), Some("cus_first"));
}
