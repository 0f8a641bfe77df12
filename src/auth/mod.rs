//! Single-admin authentication.
//!
//! Provides:
//! - Admin credential check (SHA-256 of password + server salt, constant-time compare)
//! - Session token management (opaque hex tokens, SHA-256 hashed in memory, 24h TTL)
//!
//! ## Design Decisions
//! - No JWT: tokens are opaque random strings with server-side lookup, so
//!   logout is a plain map removal.
//! - No refresh: a token's TTL is fixed at issue time.

pub mod credentials;
pub mod sessions;

pub use credentials::{hash_password, AdminCredential};
pub use sessions::{IssuedToken, SessionTokens, SESSION_TTL_SECS};
