//! Secret hashing and generation.
//!
//! Single-use token secrets are 32 random bytes, URL-safe base64 without
//! padding. Only the lowercase-hex SHA-256 of the raw secret is ever stored.
//! Password hashing uses Argon2 with per-password salts.

use argon2::password_hash::{rand_core::OsRng as SaltRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// Number of random bytes in a generated secret (before encoding).
const SECRET_BYTES: usize = 32;

/// Hash a secret for at-rest storage (lowercase hex SHA-256 of the UTF-8 input).
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a random URL-safe secret suitable for links and bearer use.
pub fn generate_secret() -> String {
    use rand::rngs::OsRng;
    use rand::RngCore;

    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a password with Argon2. The returned string embeds salt and params.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut SaltRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored Argon2 hash.
/// Malformed stored hashes verify as false rather than erroring.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_secret_is_lowercase_hex() {
        let hash = hash_secret("some-secret");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // Deterministic
        assert_eq!(hash, hash_secret("some-secret"));
    }

    #[test]
    fn test_generate_secret_is_url_safe() {
        let secret = generate_secret();
        // 32 bytes -> 43 base64 chars unpadded
        assert_eq!(secret.len(), 43);
        assert!(!secret.contains('='));
        assert!(!secret.contains('+'));
        assert!(!secret.contains('/'));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("hunter2!").expect("hashing should succeed");
        assert!(verify_password("hunter2!", &hash));
        assert!(!verify_password("hunter3!", &hash));
        assert!(!verify_password("hunter2!", "not-a-phc-string"));
    }
}
