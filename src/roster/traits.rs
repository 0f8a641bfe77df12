use super::Entry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Backing store for one entry list.
///
/// Implementations hold the raw set, expired entries included, until
/// `purge_expired` is called. Expiry filtering for readers is done by
/// [`super::EntryRepository`], not here.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Backend name ("memory", "file", "supabase").
    fn name(&self) -> &str;

    /// Every stored entry in insertion order.
    async fn all(&self) -> anyhow::Result<Vec<Entry>>;

    /// Append an entry. Returns `false` without storing anything when the
    /// username is already present, expired or not.
    async fn insert(&self, entry: &Entry) -> anyhow::Result<bool>;

    /// Remove the entry with this username. Returns whether one was removed.
    async fn delete(&self, username: &str) -> anyhow::Result<bool>;

    /// Drop entries whose expiration is at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize>;

    /// Raw stored count.
    async fn count(&self) -> anyhow::Result<usize>;
}
