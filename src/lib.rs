//! Admin gateway for two time-limited username whitelists.
//!
//! The crate is split along the request path:
//! - [`auth`]: admin credential check and bearer token lifecycle
//! - [`roster`]: entry repositories over pluggable backing stores
//! - [`gateway`]: axum HTTP API with CORS allow-list and auth gate
//! - [`client`]: HTTP client used by the CLI subcommands
//! - [`config`]: TOML + environment configuration

pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod roster;

pub use config::Config;
