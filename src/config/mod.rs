//! Configuration: `config.toml` first, then environment overrides.
//!
//! Environment variables win over the file so deployments can keep secrets
//! out of it:
//!
//! | Variable | Field |
//! |---|---|
//! | `ADMIN_EMAIL` | `admin.email` |
//! | `ADMIN_PASSWORD` | `admin.password` |
//! | `ADMIN_PASSWORD_HASH` | `admin.password_hash` |
//! | `PASSWORD_SALT` | `admin.salt` |
//! | `HOST` / `PORT` | `gateway.host` / `gateway.port` |
//! | `ALLOWED_ORIGINS` | `gateway.allowed_origins` (comma-separated) |
//! | `DNMENU_SWEEP_SECS` | `gateway.sweep_interval_secs` |
//! | `DNMENU_STORAGE` | `storage.backend` |
//! | `DNMENU_DATA_DIR` | `storage.data_dir` |
//! | `SUPABASE_URL` / `SUPABASE_SERVICE_KEY` / `SUPABASE_OWNER` | `storage.supabase.*` |

pub mod schema;

pub use schema::{
    AdminConfig, Config, GatewayConfig, StorageBackend, StorageConfig, SupabaseConfig,
};

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

impl Config {
    /// Load from `path` (must exist) or from the default location (optional),
    /// then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(email) = get("ADMIN_EMAIL") {
            self.admin.email = email.trim().to_string();
        }
        if let Some(password) = get("ADMIN_PASSWORD") {
            self.admin.password = Some(password);
        }
        if let Some(hash) = get("ADMIN_PASSWORD_HASH") {
            self.admin.password_hash = Some(hash);
        }
        if let Some(salt) = get("PASSWORD_SALT") {
            self.admin.salt = salt;
        }

        if let Some(host) = get("HOST") {
            self.gateway.host = host.trim().to_string();
        }
        if let Some(port) = get("PORT") {
            self.gateway.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value '{port}'"))?;
        }
        if let Some(origins) = get("ALLOWED_ORIGINS") {
            self.gateway.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
        if let Some(secs) = get("DNMENU_SWEEP_SECS") {
            self.gateway.sweep_interval_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid DNMENU_SWEEP_SECS value '{secs}'"))?;
        }

        if let Some(backend) = get("DNMENU_STORAGE") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(dir) = get("DNMENU_DATA_DIR") {
            self.storage.data_dir = dir;
        }

        let url = get("SUPABASE_URL");
        let key = get("SUPABASE_SERVICE_KEY");
        let owner = get("SUPABASE_OWNER");
        if url.is_some() || key.is_some() || owner.is_some() {
            let remote = self.storage.supabase.get_or_insert_with(|| SupabaseConfig {
                url: String::new(),
                service_key: String::new(),
                owner: None,
            });
            if let Some(url) = url {
                remote.url = url.trim().to_string();
            }
            if let Some(key) = key {
                remote.service_key = key.trim().to_string();
            }
            if owner.is_some() {
                remote.owner = owner;
            }
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.admin.email.trim().is_empty() {
            bail!("admin.email must not be empty");
        }
        if let Some(hash) = self.admin.password_hash.as_deref() {
            let hash = hash.trim();
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                bail!("admin.password_hash must be a 64-character hex SHA-256 digest");
            }
        }
        if self.storage.backend == StorageBackend::Supabase {
            match self.storage.supabase.as_ref() {
                Some(remote) if !remote.url.is_empty() && !remote.service_key.is_empty() => {}
                _ => bail!("Supabase storage requires SUPABASE_URL and SUPABASE_SERVICE_KEY"),
            }
        }
        Ok(())
    }
}

/// `<config_dir>/dnmenu-manager/config.toml`, when a home directory exists.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "dnmenu-manager")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
