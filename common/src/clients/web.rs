use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use tracing::debug;

use super::{build_http_client, ensure_success};
use crate::{error::AppError, utils::config::AppConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Outbound HTTP used by the scrape stage.
#[async_trait]
pub trait WebFetcher: Send + Sync {
    /// Fetches a page body as text. Non-2xx responses are errors.
    async fn fetch_page(&self, url: &str, accept_language: &str) -> Result<String, AppError>;

    /// Fetches an image. `None` when the response is not an image or exceeds the size cap.
    async fn fetch_image(&self, url: &str) -> Result<Option<FetchedImage>, AppError>;
}

#[derive(Clone)]
pub struct HttpWebFetcher {
    page_http: reqwest::Client,
    image_http: reqwest::Client,
    max_image_bytes: usize,
}

impl HttpWebFetcher {
    pub fn new(
        user_agent: &str,
        page_timeout: Duration,
        image_timeout: Duration,
        max_image_bytes: usize,
    ) -> Result<Self, AppError> {
        Ok(Self {
            page_http: build_http_client(page_timeout, Some(user_agent))?,
            image_http: build_http_client(image_timeout, Some(user_agent))?,
            max_image_bytes,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            &config.scrape_user_agent,
            Duration::from_millis(config.scrape_timeout_ms),
            Duration::from_millis(config.image_timeout_ms),
            config.image_max_bytes,
        )
    }
}

#[async_trait]
impl WebFetcher for HttpWebFetcher {
    async fn fetch_page(&self, url: &str, accept_language: &str) -> Result<String, AppError> {
        let response = self
            .page_http
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .header(ACCEPT_LANGUAGE, format!("{accept_language},en;q=0.9"))
            .send()
            .await?;

        Ok(ensure_success("page fetch", response).await?.text().await?)
    }

    async fn fetch_image(&self, url: &str) -> Result<Option<FetchedImage>, AppError> {
        let mut response = self.image_http.get(url).send().await?;
        if !response.status().is_success() {
            debug!(url, status = %response.status(), "image fetch rejected");
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            debug!(url, %content_type, "not an image");
            return Ok(None);
        }

        let declared = response.content_length().unwrap_or(0);
        if usize::try_from(declared).unwrap_or(usize::MAX) > self.max_image_bytes {
            debug!(url, declared, "image exceeds size cap");
            return Ok(None);
        }

        let mut buffer = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if buffer.len() + chunk.len() > self.max_image_bytes {
                debug!(url, "image body exceeds size cap");
                return Ok(None);
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(Some(FetchedImage {
            bytes: buffer.freeze(),
            content_type,
        }))
    }
}

/// File extension for an image content type, `jpg` when unknown.
pub fn image_extension(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/avif" => "avif",
        _ => "jpg",
    }
}
