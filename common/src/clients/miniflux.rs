use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{build_http_client, ensure_success};
use crate::{error::AppError, utils::config::AppConfig};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Enclosure {
    pub url: String,
    #[serde(default)]
    pub mime_type: String,
}

/// An unread entry as reported by the feed reader.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FeedEntry {
    pub id: i64,
    pub feed_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub enclosures: Option<Vec<Enclosure>>,
}

impl FeedEntry {
    /// First enclosure advertised as an image.
    pub fn image_enclosure(&self) -> Option<&str> {
        self.enclosures
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|enclosure| enclosure.mime_type.starts_with("image/"))
            .map(|enclosure| enclosure.url.as_str())
    }

    /// Publication time, falling back to `fallback` when missing or unparseable.
    pub fn published_at_or(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.published_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map_or(fallback, |parsed| parsed.with_timezone(&Utc))
    }
}

#[async_trait]
pub trait FeedReader: Send + Sync {
    async fn list_unread_entries(&self, limit: usize) -> Result<Vec<FeedEntry>, AppError>;
    async fn mark_read(&self, entry_id: i64) -> Result<(), AppError>;
    async fn health_check(&self) -> bool;
}

#[derive(Deserialize)]
struct EntriesResponse {
    #[serde(default)]
    entries: Vec<FeedEntry>,
}

#[derive(Serialize)]
struct UpdateEntriesRequest<'a> {
    entry_ids: &'a [i64],
    status: &'a str,
}

/// Miniflux REST client authenticated with an API token.
#[derive(Clone)]
pub struct MinifluxClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MinifluxClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            http: build_http_client(timeout, None)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            &config.miniflux_url,
            &config.miniflux_api_key,
            Duration::from_millis(config.miniflux_timeout_ms),
        )
    }
}

#[async_trait]
impl FeedReader for MinifluxClient {
    async fn list_unread_entries(&self, limit: usize) -> Result<Vec<FeedEntry>, AppError> {
        let response = self
            .http
            .get(format!("{}/v1/entries", self.base_url))
            .header("X-Auth-Token", &self.api_key)
            .query(&[("status", "unread".to_string()), ("limit", limit.to_string())])
            .send()
            .await?;

        let body: EntriesResponse = ensure_success("Miniflux fetchEntries", response)
            .await?
            .json()
            .await?;
        debug!(count = body.entries.len(), "fetched unread entries");
        Ok(body.entries)
    }

    async fn mark_read(&self, entry_id: i64) -> Result<(), AppError> {
        let response = self
            .http
            .put(format!("{}/v1/entries", self.base_url))
            .header("X-Auth-Token", &self.api_key)
            .json(&UpdateEntriesRequest {
                entry_ids: &[entry_id],
                status: "read",
            })
            .send()
            .await?;

        ensure_success("Miniflux markAsRead", response).await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/healthcheck", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_parses_miniflux_payload() {
        let raw = r#"{
            "total": 1,
            "entries": [{
                "id": 42,
                "feed_id": 7,
                "title": "東京の新しい法律",
                "url": "https://example.jp/a",
                "content": "<p>本文</p>",
                "status": "unread",
                "published_at": "2024-03-01T09:30:00+09:00",
                "enclosures": [
                    {"url": "https://example.jp/a.mp3", "mime_type": "audio/mpeg"},
                    {"url": "https://example.jp/a.jpg", "mime_type": "image/jpeg"}
                ]
            }]
        }"#;

        let body: EntriesResponse = serde_json::from_str(raw).expect("parse");
        let entry = body.entries.first().expect("entry");
        assert_eq!(entry.id, 42);
        assert_eq!(entry.image_enclosure(), Some("https://example.jp/a.jpg"));

        let published = entry.published_at_or(Utc::now());
        assert_eq!(published.to_rfc3339(), "2024-03-01T00:30:00+00:00");
    }

    #[test]
    fn missing_enclosures_and_bad_dates_fall_back() {
        let entry = FeedEntry {
            id: 1,
            feed_id: 1,
            title: String::new(),
            url: String::new(),
            content: String::new(),
            published_at: Some("yesterday".into()),
            enclosures: None,
        };
        let fallback = Utc::now();
        assert_eq!(entry.image_enclosure(), None);
        assert_eq!(entry.published_at_or(fallback), fallback);
    }
}
