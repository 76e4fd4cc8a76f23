pub mod chat;
pub mod miniflux;
pub mod translator;
pub mod web;

use std::time::Duration;

use crate::error::AppError;

pub use chat::{ChatModel, OpenAiChat};
pub use miniflux::{FeedEntry, FeedReader, MinifluxClient};
pub use translator::{LibreTranslateClient, LlmTranslator, Translator};
pub use web::{FetchedImage, HttpWebFetcher, WebFetcher};

fn build_http_client(timeout: Duration, user_agent: Option<&str>) -> Result<reqwest::Client, AppError> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent);
    }
    Ok(builder.build()?)
}

/// Turns a non-2xx response into an `Upstream` error carrying the body snippet.
async fn ensure_success(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response.text().await.unwrap_or_default();
    let detail = crate::utils::text::truncate_chars(detail.trim(), 300);
    Err(AppError::Upstream(format!("{service} failed: {status} {detail}")))
}
