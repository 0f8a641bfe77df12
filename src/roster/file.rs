//! JSON-file entry store.
//!
//! Each list lives in `<data_dir>/<list>.json` as a pretty-printed array.
//! The whole file is rewritten after every mutation (temp file + rename);
//! the in-memory copy only changes once the write has succeeded.

use super::traits::EntryStore;
use super::{Entry, ListKind};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct FileEntryStore {
    path: PathBuf,
    entries: Mutex<Vec<Entry>>,
}

impl FileEntryStore {
    /// Open (or create) the file for `kind` under `dir`.
    pub async fn open(dir: &Path, kind: ListKind) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create data dir {}", dir.display()))?;

        let path = dir.join(format!("{}.json", kind.as_str()));
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => Vec::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        tracing::info!(
            list = kind.as_str(),
            path = %path.display(),
            entries = entries.len(),
            "Loaded entry file"
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &[Entry]) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl EntryStore for FileEntryStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn all(&self) -> anyhow::Result<Vec<Entry>> {
        Ok(self.entries.lock().await.clone())
    }

    async fn insert(&self, entry: &Entry) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|e| e.username == entry.username) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.push(entry.clone());
        self.persist(&next).await?;
        *entries = next;
        Ok(true)
    }

    async fn delete(&self, username: &str) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().await;
        if !entries.iter().any(|e| e.username == username) {
            return Ok(false);
        }
        let next: Vec<Entry> = entries
            .iter()
            .filter(|e| e.username != username)
            .cloned()
            .collect();
        self.persist(&next).await?;
        *entries = next;
        Ok(true)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let mut entries = self.entries.lock().await;
        let next: Vec<Entry> = entries
            .iter()
            .filter(|e| !e.is_expired(now))
            .cloned()
            .collect();
        let removed = entries.len() - next.len();
        if removed == 0 {
            return Ok(0);
        }
        self.persist(&next).await?;
        *entries = next;
        Ok(removed)
    }

    async fn count(&self) -> anyhow::Result<usize> {
        Ok(self.entries.lock().await.len())
    }
}
