//! Admin credential check.
//!
//! There is exactly one admin identity, loaded from configuration. The
//! password is stored as the hex SHA-256 digest of `password + salt`, where
//! the salt is a single server-wide value rather than a per-record one.

use sha2::{Digest, Sha256};

/// The configured admin identity. Immutable after load.
#[derive(Clone)]
pub struct AdminCredential {
    email: String,
    password_hash: String,
    salt: String,
}

impl std::fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredential")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl AdminCredential {
    /// Build from a plaintext password; the hash is computed once here.
    pub fn from_password(email: &str, password: &str, salt: &str) -> Self {
        Self {
            email: email.to_string(),
            password_hash: hash_password(password, salt),
            salt: salt.to_string(),
        }
    }

    /// Build from an already-computed digest (see [`hash_password`]).
    pub fn from_hash(email: &str, password_hash: &str, salt: &str) -> Self {
        Self {
            email: email.to_string(),
            password_hash: password_hash.trim().to_ascii_lowercase(),
            salt: salt.to_string(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// True when both email and password match.
    ///
    /// The password digest is always computed and compared, even when the
    /// email is wrong, so both failure cases cost the same.
    pub fn verify(&self, email: &str, password: &str) -> bool {
        let attempt = hash_password(password, &self.salt);
        let hash_ok = constant_time_eq(attempt.as_bytes(), self.password_hash.as_bytes());
        let email_ok = constant_time_eq(email.as_bytes(), self.email.as_bytes());
        hash_ok & email_ok
    }
}

/// Hex SHA-256 of `password + salt`.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut h = Sha256::new();
    h.update(password.as_bytes());
    h.update(salt.as_bytes());
    hex::encode(h.finalize())
}

/// Constant-time byte comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
