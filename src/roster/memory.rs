//! Process-memory entry store. Contents are lost on restart.

use super::traits::EntryStore;
use super::Entry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: Mutex<Vec<Entry>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. from an import.
    pub fn with_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn all(&self) -> anyhow::Result<Vec<Entry>> {
        Ok(self.entries.lock().clone())
    }

    async fn insert(&self, entry: &Entry) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.username == entry.username) {
            return Ok(false);
        }
        entries.push(entry.clone());
        Ok(true)
    }

    async fn delete(&self, username: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.username != username);
        Ok(entries.len() < before)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| !e.is_expired(now));
        Ok(before - entries.len())
    }

    async fn count(&self) -> anyhow::Result<usize> {
        Ok(self.entries.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::EntryDuration;

    #[tokio::test]
    async fn insert_rejects_duplicate_username() {
        let store = MemoryEntryStore::new();
        let now = Utc::now();
        let entry = Entry::new("alice", EntryDuration::Daily, now);

        assert!(store.insert(&entry).await.unwrap());
        assert!(!store.insert(&entry).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_removed() {
        let store = MemoryEntryStore::new();
        let entry = Entry::new("bob", EntryDuration::Lifetime, Utc::now());
        store.insert(&entry).await.unwrap();

        assert!(store.delete("bob").await.unwrap());
        assert!(!store.delete("bob").await.unwrap());
    }

    #[tokio::test]
    async fn purge_keeps_lifetime_and_future_entries() {
        let now = Utc::now();
        let store = MemoryEntryStore::with_entries(vec![
            Entry::new("old", EntryDuration::Daily, now - chrono::Duration::days(2)),
            Entry::new("fresh", EntryDuration::Weekly, now),
            Entry::new("forever", EntryDuration::Lifetime, now - chrono::Duration::days(400)),
        ]);

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        let names: Vec<_> = store
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.username)
            .collect();
        assert_eq!(names, vec!["fresh", "forever"]);
    }
}
