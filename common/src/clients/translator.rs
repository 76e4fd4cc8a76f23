use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{build_http_client, ensure_success, ChatModel};
use crate::{
    error::AppError, storage::types::stage_status::TranslationProvider,
    utils::config::AppConfig,
};

/// A machine translation backend.
#[async_trait]
pub trait Translator: Send + Sync {
    fn provider(&self) -> TranslationProvider;

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, AppError>;
}

#[derive(Serialize)]
struct LibreTranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LibreTranslateResponse {
    translated_text: String,
}

#[derive(Clone)]
pub struct LibreTranslateClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LibreTranslateClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            http: build_http_client(timeout, None)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            &config.libretranslate_url,
            config.libretranslate_api_key.clone(),
            Duration::from_millis(config.libretranslate_timeout_ms),
        )
    }

    pub async fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/languages", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }
}

#[async_trait]
impl Translator for LibreTranslateClient {
    fn provider(&self) -> TranslationProvider {
        TranslationProvider::LibreTranslate
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, AppError> {
        let response = self
            .http
            .post(format!("{}/translate", self.base_url))
            .json(&LibreTranslateRequest {
                q: text,
                source,
                target,
                api_key: self.api_key.as_deref(),
            })
            .send()
            .await?;

        let body: LibreTranslateResponse = ensure_success("LibreTranslate", response)
            .await?
            .json()
            .await?;
        Ok(body.translated_text)
    }
}

fn language_name(code: &str) -> &str {
    match code {
        "ja" => "Japanese",
        "zh" => "Traditional Chinese",
        "tl" => "Filipino",
        "ko" => "Korean",
        "es" => "Spanish",
        "en" => "English",
        other => other,
    }
}

pub fn translation_system_prompt(source: &str, target: &str) -> String {
    let source_name = language_name(source);
    let target_name = language_name(target);
    format!(
        "You are a professional {source_name}-to-{target_name} translator specializing in news, legal, and economic texts. \
         Translate the following {source_name} text to {target_name}. Preserve technical terminology accurately. \
         Preserve all HTML tags and their attributes (like <img>, <a>, <div>, etc.) exactly. \
         Do not summarize or interpret; provide a faithful translation only. \
         Respond with ONLY the translated text, no explanations or preamble."
    )
}

/// Translation through a chat model, used as the fallback provider.
#[derive(Clone)]
pub struct LlmTranslator {
    chat: Arc<dyn ChatModel>,
}

impl LlmTranslator {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    fn provider(&self) -> TranslationProvider {
        TranslationProvider::Llm
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, AppError> {
        self.chat
            .complete(&translation_system_prompt(source, target), text, 0.1)
            .await
    }
}
