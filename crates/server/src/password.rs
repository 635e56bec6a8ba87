//! Password hashing.
//!
//! New digests are Argon2id PHC strings with a per-record random salt.
//! Records written by older deployments hold an unsalted SHA-256 hex digest;
//! those still verify (as [`Verification::ValidLegacy`]) so the caller can
//! upgrade them, but are never written.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a legacy hex digest.
const LEGACY_DIGEST_LENGTH: usize = 64;

/// Hashing a password failed.
#[derive(Debug, Error)]
#[error("password hashing failed")]
pub struct HashError;

/// Outcome of checking a password against a stored digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Matches an Argon2 digest.
    Valid,
    /// Matches a legacy SHA-256 digest; the record should be re-hashed.
    ValidLegacy,
    /// Does not match, or the stored digest is unreadable.
    Invalid,
}

impl Verification {
    /// Whether the password matched.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

/// Legacy unsalted SHA-256 digest as lowercase hex.
#[must_use]
pub fn legacy_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Whether a stored digest is in the legacy format.
#[must_use]
pub fn is_legacy_digest(stored: &str) -> bool {
    stored.len() == LEGACY_DIGEST_LENGTH
        && stored
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Hash a password with Argon2id and a fresh salt.
///
/// # Errors
///
/// Returns `HashError` if the hasher rejects its input.
pub fn hash_password(password: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| HashError)
}

/// Verify a password against a stored digest of either format.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> Verification {
    if is_legacy_digest(stored) {
        return if constant_time_compare(&legacy_digest(password), stored) {
            Verification::ValidLegacy
        } else {
            Verification::Invalid
        };
    }

    let Ok(parsed_hash) = PasswordHash::new(stored) else {
        return Verification::Invalid;
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Verification::Valid,
        Err(_) => Verification::Invalid,
    }
}

/// Constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_digest_known_values() {
        assert_eq!(
            legacy_digest("Secret123"),
            "2ed06766795d58a4f22d511a672f20a6b096d3fe5b56af3a744678a9a356fd82"
        );
        assert_eq!(
            legacy_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_legacy_digest_deterministic() {
        assert_eq!(legacy_digest("hunter22"), legacy_digest("hunter22"));
        assert_ne!(legacy_digest("hunter22"), legacy_digest("hunter23"));
    }

    #[test]
    fn test_is_legacy_digest() {
        assert!(is_legacy_digest(&legacy_digest("x")));
        assert!(!is_legacy_digest(&legacy_digest("x").to_uppercase()));
        assert!(!is_legacy_digest("abc"));
        assert!(!is_legacy_digest(&hash_password("x").unwrap()));
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Secret123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert_eq!(verify_password("Secret123", &hash), Verification::Valid);
        assert_eq!(verify_password("Secret124", &hash), Verification::Invalid);
    }

    #[test]
    fn test_hash_is_salted() {
        let first = hash_password("Secret123").unwrap();
        let second = hash_password("Secret123").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_legacy() {
        let stored = legacy_digest("Secret123");
        assert_eq!(
            verify_password("Secret123", &stored),
            Verification::ValidLegacy
        );
        assert_eq!(verify_password("secret123", &stored), Verification::Invalid);
    }

    #[test]
    fn test_verify_unreadable_digest() {
        assert_eq!(verify_password("x", ""), Verification::Invalid);
        assert_eq!(verify_password("x", "not-a-hash"), Verification::Invalid);
        assert!(!Verification::Invalid.is_valid());
        assert!(Verification::ValidLegacy.is_valid());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
    }
}
