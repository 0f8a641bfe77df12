//! Whitelist entries and their repositories.
//!
//! There are two independent lists, `users` and `usersfarm`, with the same
//! shape and rules. Each is an [`EntryRepository`] over its own
//! [`EntryStore`]; the store decides where entries live (memory, a JSON
//! file, or a remote Supabase table), the repository owns the rules:
//! expiration math, uniqueness, and expiry filtering on read.

pub mod file;
pub mod memory;
pub mod supabase;
pub mod traits;

pub use file::FileEntryStore;
pub use memory::MemoryEntryStore;
pub use supabase::SupabaseEntryStore;
pub use traits::EntryStore;

use crate::clock::Clock;
use crate::config::{StorageBackend, StorageConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── List identity ────────────────────────────────────────────────

/// Which of the two whitelists an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Users,
    UsersFarm,
}

impl ListKind {
    pub const ALL: [ListKind; 2] = [ListKind::Users, ListKind::UsersFarm];

    /// Path segment, file stem and remote table name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::UsersFarm => "usersfarm",
        }
    }

    /// Key wrapping the entry array in list responses.
    pub fn response_key(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::UsersFarm => "usersFarm",
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ListKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "users" => Ok(Self::Users),
            "usersfarm" | "users-farm" | "farm" => Ok(Self::UsersFarm),
            other => Err(format!("unknown list '{other}' (expected users or usersfarm)")),
        }
    }
}

// ── Duration ─────────────────────────────────────────────────────

/// Subscription length of an entry.
///
/// Values outside the four known ones are kept verbatim and never expire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryDuration {
    Daily,
    Weekly,
    Monthly,
    Lifetime,
    Other(String),
}

impl EntryDuration {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Lifetime => "lifetime",
            Self::Other(raw) => raw,
        }
    }

    fn unspecified() -> Self {
        Self::Other(String::new())
    }

    /// Time until expiry, or `None` for entries that never expire.
    pub fn offset(&self) -> Option<chrono::Duration> {
        match self {
            Self::Daily => Some(chrono::Duration::hours(24)),
            Self::Weekly => Some(chrono::Duration::days(7)),
            Self::Monthly => Some(chrono::Duration::days(30)),
            Self::Lifetime | Self::Other(_) => None,
        }
    }
}

impl From<String> for EntryDuration {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            "lifetime" => Self::Lifetime,
            _ => Self::Other(raw),
        }
    }
}

impl From<EntryDuration> for String {
    fn from(duration: EntryDuration) -> Self {
        match duration {
            EntryDuration::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::str::FromStr for EntryDuration {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl std::fmt::Display for EntryDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expiration for an entry created at `now`.
pub fn calculate_expiration(duration: &EntryDuration, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    duration.offset().map(|offset| now + offset)
}

// ── Entry ────────────────────────────────────────────────────────

/// One whitelisted username.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub username: String,
    /// Older data files can lack the key; such entries load as an empty,
    /// never-expiring duration.
    #[serde(default = "EntryDuration::unspecified")]
    pub duration: EntryDuration,
    /// `None` means the entry never expires.
    pub expiration: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
}

impl Entry {
    pub fn new(username: &str, duration: EntryDuration, now: DateTime<Utc>) -> Self {
        Self {
            username: username.to_string(),
            expiration: calculate_expiration(&duration, now),
            duration,
            added_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|exp| exp <= now)
    }
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("username is required")]
    MissingUsername,
    #[error("username '{0}' already exists")]
    Duplicate(String),
    #[error("username '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

// ── Repository ───────────────────────────────────────────────────

/// Rules for one list over an injected store.
pub struct EntryRepository {
    kind: ListKind,
    store: Arc<dyn EntryStore>,
    clock: Arc<dyn Clock>,
    /// Serialises mutations so check-then-insert is atomic in-process.
    write_lock: tokio::sync::Mutex<()>,
}

impl EntryRepository {
    pub fn new(kind: ListKind, store: Arc<dyn EntryStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            store,
            clock,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Unexpired entries. Expired ones are purged from the store first.
    pub async fn list(&self) -> Result<Vec<Entry>, RosterError> {
        let now = self.clock.now();
        let purged = {
            let _guard = self.write_lock.lock().await;
            self.store.purge_expired(now).await?
        };
        if purged > 0 {
            tracing::debug!(list = %self.kind, purged, "Compacted expired entries on read");
        }

        let entries = self.store.all().await?;
        Ok(entries.into_iter().filter(|e| !e.is_expired(now)).collect())
    }

    /// Add a username.
    ///
    /// The duplicate check runs against the stored set, so an entry that has
    /// expired but not yet been purged still blocks re-adding until the next
    /// `list` or sweep removes it.
    pub async fn add(&self, username: &str, duration: EntryDuration) -> Result<Entry, RosterError> {
        if username.trim().is_empty() {
            return Err(RosterError::MissingUsername);
        }

        let _guard = self.write_lock.lock().await;
        let entry = Entry::new(username, duration, self.clock.now());
        if !self.store.insert(&entry).await? {
            return Err(RosterError::Duplicate(username.to_string()));
        }

        tracing::info!(
            list = %self.kind,
            username = %entry.username,
            duration = %entry.duration,
            "Entry added"
        );
        Ok(entry)
    }

    pub async fn remove(&self, username: &str) -> Result<(), RosterError> {
        let _guard = self.write_lock.lock().await;
        if !self.store.delete(username).await? {
            return Err(RosterError::NotFound(username.to_string()));
        }
        tracing::info!(list = %self.kind, username, "Entry removed");
        Ok(())
    }

    /// Raw stored count, expired-but-unpurged entries included.
    pub async fn count(&self) -> Result<usize, RosterError> {
        Ok(self.store.count().await?)
    }

    pub async fn purge_expired(&self) -> Result<usize, RosterError> {
        let _guard = self.write_lock.lock().await;
        Ok(self.store.purge_expired(self.clock.now()).await?)
    }
}

/// Open the configured backing store for one list.
pub async fn open_store(
    config: &StorageConfig,
    kind: ListKind,
) -> anyhow::Result<Arc<dyn EntryStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryEntryStore::new())),
        StorageBackend::File => {
            let dir = config.data_dir_path();
            Ok(Arc::new(FileEntryStore::open(&dir, kind).await?))
        }
        StorageBackend::Supabase => {
            let remote = config.supabase.clone().ok_or_else(|| {
                anyhow::anyhow!("storage.backend = \"supabase\" requires [storage.supabase]")
            })?;
            Ok(Arc::new(SupabaseEntryStore::new(remote, kind)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn repo() -> (Arc<ManualClock>, EntryRepository) {
        let clock = Arc::new(ManualClock::default());
        let repo = EntryRepository::new(
            ListKind::Users,
            Arc::new(MemoryEntryStore::new()),
            clock.clone(),
        );
        (clock, repo)
    }

    #[test]
    fn expiration_offsets_per_duration() {
        let now = Utc::now();
        assert_eq!(
            calculate_expiration(&EntryDuration::Daily, now),
            Some(now + chrono::Duration::hours(24))
        );
        assert_eq!(
            calculate_expiration(&EntryDuration::Weekly, now),
            Some(now + chrono::Duration::days(7))
        );
        assert_eq!(
            calculate_expiration(&EntryDuration::Monthly, now),
            Some(now + chrono::Duration::days(30))
        );
        assert_eq!(calculate_expiration(&EntryDuration::Lifetime, now), None);
        assert_eq!(
            calculate_expiration(&EntryDuration::from("yearly".to_string()), now),
            None
        );
    }

    #[test]
    fn duration_round_trips_unknown_values() {
        let d: EntryDuration = serde_json::from_str("\"Quarterly\"").unwrap();
        assert_eq!(d, EntryDuration::Other("Quarterly".into()));
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"Quarterly\"");
        // matching is case-sensitive
        assert_eq!(
            EntryDuration::from("Daily".to_string()),
            EntryDuration::Other("Daily".into())
        );
    }

    #[test]
    fn entry_serializes_with_camel_case_and_null_expiration() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = Entry::new("alice", EntryDuration::Lifetime, now);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["duration"], "lifetime");
        assert!(json["expiration"].is_null());
        assert!(json["addedAt"].as_str().unwrap().starts_with("2024-05-01T12:00:00"));
    }

    #[test]
    fn list_kind_parsing_and_keys() {
        assert_eq!("users".parse::<ListKind>().unwrap(), ListKind::Users);
        assert_eq!("UsersFarm".parse::<ListKind>().unwrap(), ListKind::UsersFarm);
        assert!("admins".parse::<ListKind>().is_err());
        assert_eq!(ListKind::UsersFarm.response_key(), "usersFarm");
        assert_eq!(ListKind::UsersFarm.as_str(), "usersfarm");
    }

    #[tokio::test]
    async fn add_then_list_contains_exactly_one() {
        let (_clock, repo) = repo();
        repo.add("alice", EntryDuration::Daily).await.unwrap();

        let entries = repo.list().await.unwrap();
        assert_eq!(entries.iter().filter(|e| e.username == "alice").count(), 1);
    }

    #[tokio::test]
    async fn second_add_is_duplicate() {
        let (_clock, repo) = repo();
        repo.add("alice", EntryDuration::Daily).await.unwrap();
        let err = repo.add("alice", EntryDuration::Lifetime).await.unwrap_err();
        assert!(matches!(err, RosterError::Duplicate(ref u) if u == "alice"));
    }

    #[tokio::test]
    async fn blank_username_is_rejected() {
        let (_clock, repo) = repo();
        assert!(matches!(
            repo.add("   ", EntryDuration::Daily).await,
            Err(RosterError::MissingUsername)
        ));
    }

    #[tokio::test]
    async fn username_is_stored_untrimmed() {
        let (_clock, repo) = repo();
        let entry = repo.add(" spaced ", EntryDuration::Daily).await.unwrap();
        assert_eq!(entry.username, " spaced ");
    }

    #[tokio::test]
    async fn list_never_returns_expired_entries() {
        let (clock, repo) = repo();
        repo.add("daily", EntryDuration::Daily).await.unwrap();
        repo.add("weekly", EntryDuration::Weekly).await.unwrap();
        repo.add("forever", EntryDuration::Lifetime).await.unwrap();

        clock.advance(chrono::Duration::hours(24));
        let names: Vec<_> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.username)
            .collect();
        assert_eq!(names, vec!["weekly", "forever"]);

        clock.advance(chrono::Duration::days(365));
        let names: Vec<_> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.username)
            .collect();
        assert_eq!(names, vec!["forever"]);
    }

    #[tokio::test]
    async fn expired_duplicate_blocks_until_read_purges_it() {
        let (clock, repo) = repo();
        repo.add("alice", EntryDuration::Daily).await.unwrap();
        clock.advance(chrono::Duration::days(2));

        // still physically stored
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(matches!(
            repo.add("alice", EntryDuration::Weekly).await,
            Err(RosterError::Duplicate(_))
        ));

        assert!(repo.list().await.unwrap().is_empty());
        let readded = repo.add("alice", EntryDuration::Weekly).await.unwrap();
        assert_eq!(readded.duration, EntryDuration::Weekly);
    }

    #[tokio::test]
    async fn remove_then_list_has_no_entry() {
        let (_clock, repo) = repo();
        repo.add("alice", EntryDuration::Monthly).await.unwrap();
        repo.add("bob", EntryDuration::Monthly).await.unwrap();

        repo.remove("alice").await.unwrap();
        let entries = repo.list().await.unwrap();
        assert!(entries.iter().all(|e| e.username != "alice"));
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn remove_absent_is_not_found() {
        let (_clock, repo) = repo();
        assert!(matches!(
            repo.remove("ghost").await,
            Err(RosterError::NotFound(ref u)) if u == "ghost"
        ));
    }

    #[tokio::test]
    async fn unknown_duration_never_expires() {
        let (clock, repo) = repo();
        let entry = repo
            .add("odd", EntryDuration::from("fortnightly".to_string()))
            .await
            .unwrap();
        assert!(entry.expiration.is_none());

        clock.advance(chrono::Duration::days(1000));
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_expired_reports_count() {
        let (clock, repo) = repo();
        repo.add("a", EntryDuration::Daily).await.unwrap();
        repo.add("b", EntryDuration::Lifetime).await.unwrap();
        clock.advance(chrono::Duration::days(2));
        assert_eq!(repo.purge_expired().await.unwrap(), 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn open_store_memory_backend() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            ..StorageConfig::default()
        };
        let store = open_store(&config, ListKind::Users).await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn open_store_supabase_requires_settings() {
        let config = StorageConfig {
            backend: StorageBackend::Supabase,
            supabase: None,
            ..StorageConfig::default()
        };
        assert!(open_store(&config, ListKind::Users).await.is_err());
    }
}
