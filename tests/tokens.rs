//! Single-use token tests: exactly-once redemption, reissue invalidation,
//! expiry, and purpose scoping.

mod common;

use common::*;
use storefront::tokens;

#[test]
fn test_issue_and_consume_roundtrip() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let raw = tokens::issue(&mut conn, &user.id, TokenPurpose::EmailVerification, 3600)
        .expect("issue should succeed");

    let redeemed = tokens::consume(&conn, &raw, TokenPurpose::EmailVerification)
        .expect("consume should not error")
        .expect("a fresh token should redeem");
    assert_eq!(redeemed.id, user.id);
}

#[test]
fn test_token_is_single_use() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let raw = tokens::issue(&mut conn, &user.id, TokenPurpose::PasswordReset, 3600).unwrap();

    assert!(tokens::consume(&conn, &raw, TokenPurpose::PasswordReset)
        .unwrap()
        .is_some());

    // A second consume of the same raw value always fails
    assert!(tokens::consume(&conn, &raw, TokenPurpose::PasswordReset)
        .unwrap()
        .is_none());
}

#[test]
fn test_reissue_invalidates_prior_token() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let first = tokens::issue(&mut conn, &user.id, TokenPurpose::EmailVerification, 3600).unwrap();
    let second = tokens::issue(&mut conn, &user.id, TokenPurpose::EmailVerification, 3600).unwrap();
    assert_ne!(first, second);

    // The first token is gone, not just unredeemable
    assert!(tokens::consume(&conn, &first, TokenPurpose::EmailVerification)
        .unwrap()
        .is_none());
    assert!(tokens::consume(&conn, &second, TokenPurpose::EmailVerification)
        .unwrap()
        .is_some());
}

#[test]
fn test_reissue_does_not_touch_other_purposes() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let refresh = tokens::issue(&mut conn, &user.id, TokenPurpose::RefreshSession, 3600).unwrap();
    tokens::issue(&mut conn, &user.id, TokenPurpose::EmailVerification, 3600).unwrap();

    assert!(tokens::consume(&conn, &refresh, TokenPurpose::RefreshSession)
        .unwrap()
        .is_some());
}

#[test]
fn test_expired_token_fails() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let raw = tokens::issue(&mut conn, &user.id, TokenPurpose::PasswordReset, -1).unwrap();

    assert!(tokens::consume(&conn, &raw, TokenPurpose::PasswordReset)
        .unwrap()
        .is_none());
}

#[test]
fn test_purpose_mismatch_fails_without_spending() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let raw = tokens::issue(&mut conn, &user.id, TokenPurpose::EmailVerification, 3600).unwrap();

    assert!(tokens::consume(&conn, &raw, TokenPurpose::PasswordReset)
        .unwrap()
        .is_none());

    // The mismatch did not consume the token for its real purpose
    assert!(tokens::consume(&conn, &raw, TokenPurpose::EmailVerification)
        .unwrap()
        .is_some());
}

#[test]
fn test_unknown_token_fails() {
    let conn = setup_test_db();
    assert!(tokens::consume(&conn, "never-issued", TokenPurpose::EmailVerification)
        .unwrap()
        .is_none());
}

#[test]
fn test_is_already_redeemed_distinguishes_clicked_from_unknown() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let raw = tokens::issue(&mut conn, &user.id, TokenPurpose::EmailVerification, 3600).unwrap();

    // Unused token: not redeemed yet
    assert!(!tokens::is_already_redeemed(&conn, &raw).unwrap());

    // Redeem it and verify the account, as the verification flow does
    let redeemed = tokens::consume(&conn, &raw, TokenPurpose::EmailVerification)
        .unwrap()
        .unwrap();
    queries::mark_email_verified(&conn, &redeemed.id).unwrap();

    assert!(tokens::is_already_redeemed(&conn, &raw).unwrap());

    // A value that never existed is not "already redeemed"
    assert!(!tokens::is_already_redeemed(&conn, "never-issued").unwrap());
}

#[test]
fn test_is_already_redeemed_requires_verified_user() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let raw = tokens::issue(&mut conn, &user.id, TokenPurpose::EmailVerification, 3600).unwrap();
    tokens::consume(&conn, &raw, TokenPurpose::EmailVerification)
        .unwrap()
        .unwrap();

    // Token used but the account never ended up verified
    assert!(!tokens::is_already_redeemed(&conn, &raw).unwrap());
}

#[test]
fn test_revoke_for_user() {
    let mut conn = setup_test_db();
    let user = create_test_user(&conn, "alice");

    let raw = tokens::issue(&mut conn, &user.id, TokenPurpose::PasswordReset, 3600).unwrap();
    tokens::revoke_for_user(&conn, &user.id, TokenPurpose::PasswordReset).unwrap();

    assert!(tokens::consume(&conn, &raw, TokenPurpose::PasswordReset)
        .unwrap()
        .is_none());
}
