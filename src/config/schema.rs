use crate::auth::AdminCredential;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";
const DEFAULT_ADMIN_PASSWORD: &str = "change-me";
const DEFAULT_PASSWORD_SALT: &str = "default-salt";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

// ── Top-level ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub admin: AdminConfig,
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
}

// ── Admin ────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub email: String,
    /// Plaintext password, hashed at startup. Ignored when `password_hash` is set.
    pub password: Option<String>,
    /// Hex SHA-256 of `password + salt`, as printed by `hash-password`.
    pub password_hash: Option<String>,
    pub salt: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            email: DEFAULT_ADMIN_EMAIL.into(),
            password: None,
            password_hash: None,
            salt: DEFAULT_PASSWORD_SALT.into(),
        }
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_hash", &self.password_hash.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl AdminConfig {
    /// True when neither a password nor a hash was configured.
    pub fn uses_default_password(&self) -> bool {
        self.password_hash.is_none() && self.password.is_none()
    }

    pub fn credential(&self) -> AdminCredential {
        match self.password_hash.as_deref() {
            Some(hash) => AdminCredential::from_hash(&self.email, hash, &self.salt),
            None => AdminCredential::from_password(
                &self.email,
                self.password.as_deref().unwrap_or(DEFAULT_ADMIN_PASSWORD),
                &self.salt,
            ),
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Exact match, scheme and port included.
    pub allowed_origins: Vec<String>,
    /// Background purge of expired tokens and entries. 0 disables it.
    pub sweep_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            allowed_origins: vec![
                "https://dnmenu.vercel.app".into(),
                "http://localhost:3000".into(),
                "http://localhost:5000".into(),
            ],
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

// ── Storage ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Supabase,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "supabase" => Ok(Self::Supabase),
            other => anyhow::bail!("Unknown storage backend '{other}' (memory|file|supabase)"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the `file` backend. `~` is expanded.
    pub data_dir: String,
    pub supabase: Option<SupabaseConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: "data".into(),
            supabase: None,
        }
    }
}

impl StorageConfig {
    pub fn data_dir_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).into_owned())
    }
}

/// Supabase connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Supabase project URL (e.g., https://xxxx.supabase.co).
    pub url: String,
    /// Service role key (server-side, never exposed to clients).
    pub service_key: String,
    /// Value of the `owner` column every row is scoped to.
    #[serde(default)]
    pub owner: Option<String>,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}
