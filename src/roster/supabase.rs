//! Supabase (PostgREST) entry store.
//!
//! One table per list (`users`, `usersfarm`) with columns
//! `username, duration, expiration, added_at, owner`. `insert` looks the
//! username up first (callers hold the repository write lock). A 409 from a
//! `unique nulls not distinct (owner, username)` constraint is also reported
//! as a duplicate, which covers several instances sharing one table.
//!
//! Reads page through the table with `Range` headers, since PostgREST caps
//! each response at the project's max-rows setting.
//!
//! ## Design
//! - HTTP client (reqwest) against the PostgREST table endpoint
//! - Service-key authentication for server-side operations
//! - Optional `owner` column scopes every query to one admin

use super::traits::EntryStore;
use super::{Entry, EntryDuration, ListKind};
use crate::config::SupabaseConfig;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Rows requested per `Range` page. Matches the Supabase max-rows default.
const PAGE_SIZE: usize = 1000;

/// Row shape in the remote table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryRow {
    username: String,
    duration: EntryDuration,
    expiration: Option<DateTime<Utc>>,
    added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner: Option<String>,
}

impl EntryRow {
    fn from_entry(entry: &Entry, owner: Option<&str>) -> Self {
        Self {
            username: entry.username.clone(),
            duration: entry.duration.clone(),
            expiration: entry.expiration,
            added_at: entry.added_at,
            owner: owner.map(str::to_string),
        }
    }

    fn into_entry(self) -> Entry {
        Entry {
            username: self.username,
            duration: self.duration,
            expiration: self.expiration,
            added_at: self.added_at,
        }
    }
}

pub struct SupabaseEntryStore {
    config: SupabaseConfig,
    table: String,
    http: reqwest::Client,
}

impl SupabaseEntryStore {
    pub fn new(config: SupabaseConfig, kind: ListKind) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            config,
            table: kind.as_str().to_string(),
            http,
        })
    }

    /// Build the PostgREST URL for this store's table.
    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.url.trim_end_matches('/'),
            self.table
        )
    }

    /// Start a request with service-key auth and the owner filter applied.
    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .request(method, self.table_url())
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key);
        if let Some(owner) = self.config.owner.as_deref() {
            request = request.query(&[("owner", format!("eq.{owner}"))]);
        }
        request
    }

    /// Whether a row with this username exists in the owner's scope.
    async fn exists(&self, username: &str) -> anyhow::Result<bool> {
        let resp = self
            .request(reqwest::Method::GET)
            .query(&[
                ("select", "username".to_string()),
                ("username", format!("eq.{username}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_for(resp, "lookup").await);
        }
        let rows: Vec<serde_json::Value> = resp.json().await?;
        Ok(!rows.is_empty())
    }

    async fn error_for(resp: reqwest::Response, action: &str) -> anyhow::Error {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::anyhow!("Supabase {action} failed ({status}): {body}")
    }
}

#[async_trait]
impl EntryStore for SupabaseEntryStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn all(&self) -> anyhow::Result<Vec<Entry>> {
        let mut entries = Vec::new();
        loop {
            let from = entries.len();
            let resp = self
                .request(reqwest::Method::GET)
                .query(&[("select", "*"), ("order", "added_at.asc,username.asc")])
                .header("Range-Unit", "items")
                .header("Range", format!("{from}-{}", from + PAGE_SIZE - 1))
                .send()
                .await?;
            if resp.status() == StatusCode::RANGE_NOT_SATISFIABLE {
                break;
            }
            if !resp.status().is_success() {
                return Err(Self::error_for(resp, "select").await);
            }
            let rows: Vec<EntryRow> = resp.json().await?;
            let page_len = rows.len();
            entries.extend(rows.into_iter().map(EntryRow::into_entry));
            if page_len < PAGE_SIZE {
                break;
            }
        }
        Ok(entries)
    }

    async fn insert(&self, entry: &Entry) -> anyhow::Result<bool> {
        if self.exists(&entry.username).await? {
            return Ok(false);
        }
        let row = EntryRow::from_entry(entry, self.config.owner.as_deref());
        let resp = self
            .http
            .post(self.table_url())
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await?;

        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            _ => Err(Self::error_for(resp, "insert").await),
        }
    }

    async fn delete(&self, username: &str) -> anyhow::Result<bool> {
        let resp = self
            .request(reqwest::Method::DELETE)
            .query(&[("username", format!("eq.{username}"))])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_for(resp, "delete").await);
        }
        let removed: Vec<EntryRow> = resp.json().await?;
        Ok(!removed.is_empty())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let cutoff = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let resp = self
            .request(reqwest::Method::DELETE)
            .query(&[("expiration", format!("lte.{cutoff}"))])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::error_for(resp, "purge").await);
        }
        let removed: Vec<EntryRow> = resp.json().await?;
        Ok(removed.len())
    }

    async fn count(&self) -> anyhow::Result<usize> {
        let resp = self
            .request(reqwest::Method::GET)
            .query(&[("select", "username")])
            .header("Prefer", "count=exact")
            .header("Range-Unit", "items")
            .header("Range", "0-0")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() && status != StatusCode::RANGE_NOT_SATISFIABLE {
            return Err(Self::error_for(resp, "count").await);
        }
        resp.headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .ok_or_else(|| anyhow::anyhow!("Supabase count response has no usable Content-Range"))
    }
}

/// Total from a PostgREST `Content-Range` value such as `0-24/318` or `*/0`.
fn content_range_total(value: &str) -> Option<usize> {
    let (_, total) = value.split_once('/')?;
    total.trim().parse().ok()
}
