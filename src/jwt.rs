//! Short-lived HS256 access tokens.
//!
//! This is the signed-bearer-token collaborator: minting and verification
//! only, no session state. Refresh is handled by the single-use token
//! service, not here.

use jwt_simple::prelude::*;

use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct AccessTokenSigner {
    key: HS256Key,
}

impl AccessTokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            key: HS256Key::from_bytes(secret.as_bytes()),
        }
    }

    /// Mint an access token for a username with the given lifetime.
    pub fn mint(&self, username: &str, ttl_secs: u64) -> Result<String> {
        let claims = Claims::create(Duration::from_secs(ttl_secs)).with_subject(username);
        self.key
            .authenticate(claims)
            .map_err(|e| AppError::Internal(format!("Failed to sign access token: {}", e)))
    }

    /// Verify a token and return the username it was minted for.
    /// Any verification failure (bad signature, expiry, malformed) is
    /// reported as `Unauthorized`.
    pub fn verify(&self, token: &str) -> Result<String> {
        let claims = self
            .key
            .verify_token::<NoCustomClaims>(token, None)
            .map_err(|_| AppError::Unauthorized)?;
        claims.subject.ok_or(AppError::Unauthorized)
    }
}
