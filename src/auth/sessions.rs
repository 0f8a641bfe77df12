//! In-memory bearer token issuer.
//!
//! Tokens are 32 random bytes, hex-encoded, handed out once at login. Only
//! the SHA-256 of each token is kept, together with its expiry. Expired
//! tokens are evicted lazily: on every `validate` of that token and in bulk
//! on every `issue`. A background sweep may call [`SessionTokens::purge_expired`]
//! as well, but nothing depends on it.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Session lifetime: 24 hours (seconds).
pub const SESSION_TTL_SECS: i64 = 24 * 3600;

/// Token byte length before hex encoding (32 bytes = 64 hex chars).
const TOKEN_BYTES: usize = 32;

/// A freshly issued token. The plaintext value is only available here.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in_secs: i64,
}

pub struct SessionTokens {
    /// token hash -> expiry
    tokens: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl SessionTokens {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, SESSION_TTL_SECS)
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl_secs: i64) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::seconds(ttl_secs),
            clock,
        }
    }

    /// Issue a new token and drop every token that has already expired.
    pub fn issue(&self) -> IssuedToken {
        let token = generate_token();
        let now = self.clock.now();
        let expires_at = now + self.ttl;

        let mut tokens = self.tokens.lock();
        tokens.insert(hash_token(&token), expires_at);
        tokens.retain(|_, exp| *exp > now);

        IssuedToken {
            token,
            expires_at,
            expires_in_secs: self.ttl.num_seconds(),
        }
    }

    /// True iff the token is known and not yet expired. An expired token is
    /// removed as a side effect.
    pub fn validate(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let key = hash_token(token);
        let now = self.clock.now();

        let mut tokens = self.tokens.lock();
        match tokens.get(&key) {
            Some(exp) if *exp > now => true,
            Some(_) => {
                tokens.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Remove a token unconditionally. Returns whether it was present.
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.lock().remove(&hash_token(token)).is_some()
    }

    /// Drop all expired tokens, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|_, exp| *exp > now);
        before - tokens.len()
    }

    /// Number of tokens currently held, including any not yet evicted.
    pub fn active_count(&self) -> usize {
        self.tokens.lock().len()
    }
}

/// Generate a random session token (hex-encoded).
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a session token (SHA-256, single pass; tokens are already high-entropy).
fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn sessions() -> (Arc<ManualClock>, SessionTokens) {
        let clock = Arc::new(ManualClock::default());
        let tokens = SessionTokens::new(clock.clone());
        (clock, tokens)
    }

    #[test]
    fn issued_token_is_valid_immediately() {
        let (_clock, sessions) = sessions();
        let issued = sessions.issue();
        assert_eq!(issued.token.len(), TOKEN_BYTES * 2);
        assert_eq!(issued.expires_in_secs, 86_400);
        assert!(sessions.validate(&issued.token));
    }

    #[test]
    fn tokens_are_unique() {
        let (_clock, sessions) = sessions();
        let a = sessions.issue();
        let b = sessions.issue();
        assert_ne!(a.token, b.token);
        assert_eq!(sessions.active_count(), 2);
    }

    #[test]
    fn token_expires_after_ttl_and_is_evicted() {
        let (clock, sessions) = sessions();
        let issued = sessions.issue();

        clock.advance(chrono::Duration::hours(23));
        assert!(sessions.validate(&issued.token));

        clock.advance(chrono::Duration::hours(1));
        assert!(!sessions.validate(&issued.token));
        assert_eq!(sessions.active_count(), 0);
    }

    #[test]
    fn validation_does_not_extend_ttl() {
        let (clock, sessions) = sessions();
        let issued = sessions.issue();
        for _ in 0..4 {
            clock.advance(chrono::Duration::hours(6));
            sessions.validate(&issued.token);
        }
        assert!(!sessions.validate(&issued.token));
    }

    #[test]
    fn revoke_invalidates_immediately() {
        let (_clock, sessions) = sessions();
        let issued = sessions.issue();
        assert!(sessions.revoke(&issued.token));
        assert!(!sessions.validate(&issued.token));
        assert!(!sessions.revoke(&issued.token));
    }

    #[test]
    fn issue_purges_expired_tokens() {
        let (clock, sessions) = sessions();
        sessions.issue();
        sessions.issue();
        clock.advance(chrono::Duration::hours(25));

        let fresh = sessions.issue();
        assert_eq!(sessions.active_count(), 1);
        assert!(sessions.validate(&fresh.token));
    }

    #[test]
    fn purge_expired_reports_removed() {
        let (clock, sessions) = sessions();
        sessions.issue();
        clock.advance(chrono::Duration::hours(12));
        let keep = sessions.issue();
        clock.advance(chrono::Duration::hours(13));

        assert_eq!(sessions.purge_expired(), 1);
        assert!(sessions.validate(&keep.token));
    }

    #[test]
    fn unknown_and_empty_tokens_are_rejected() {
        let (_clock, sessions) = sessions();
        assert!(!sessions.validate(""));
        assert!(!sessions.validate("invalid_token_value"));
    }

    #[test]
    fn plaintext_token_is_not_stored() {
        let (_clock, sessions) = sessions();
        let issued = sessions.issue();
        let tokens = sessions.tokens.lock();
        assert!(!tokens.contains_key(&issued.token));
        assert!(tokens.contains_key(&hash_token(&issued.token)));
    }
}
