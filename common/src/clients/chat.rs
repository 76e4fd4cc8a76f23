use std::{sync::Arc, time::Duration};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;

use super::build_http_client;
use crate::{error::AppError, utils::config::AppConfig};

/// Single-turn chat completion: a system prompt plus one user message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str, temperature: f32)
        -> Result<String, AppError>;
}

/// OpenAI-compatible client pointed at the configured base URL, with the LLM timeout applied.
pub fn openai_client(config: &AppConfig) -> Result<Client<OpenAIConfig>, AppError> {
    let http = build_http_client(Duration::from_millis(config.llm_timeout_ms), None)?;
    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.openai_api_key)
        .with_api_base(&config.openai_base_url);

    Ok(Client::with_config(openai_config).with_http_client(http))
}

#[derive(Clone)]
pub struct OpenAiChat {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiChat {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(system).into(),
                ChatCompletionRequestUserMessage::from(user).into(),
            ])
            .temperature(temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(ToOwned::to_owned)
            .ok_or_else(|| AppError::LLMParsing("chat completion returned empty response".into()))
    }
}
