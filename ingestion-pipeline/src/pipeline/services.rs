use std::sync::Arc;

use async_trait::async_trait;
use common::{
    clients::{ChatModel, Translator, WebFetcher},
    error::AppError,
    utils::embedding::Embedder,
};

use crate::utils::images::ImagePersister;

/// External collaborators the stages depend on.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn fetch_page(&self, url: &str, accept_language: &str) -> Result<String, AppError>;

    async fn persist_image(&self, article_id: &str, image_url: &str) -> Option<String>;

    /// Translation providers in priority order.
    fn translators(&self) -> &[Arc<dyn Translator>];

    async fn complete_chat(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, AppError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in &texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

pub struct DefaultPipelineServices {
    fetcher: Arc<dyn WebFetcher>,
    images: Arc<dyn ImagePersister>,
    translators: Vec<Arc<dyn Translator>>,
    chat: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
}

impl DefaultPipelineServices {
    pub fn new(
        fetcher: Arc<dyn WebFetcher>,
        images: Arc<dyn ImagePersister>,
        translators: Vec<Arc<dyn Translator>>,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            fetcher,
            images,
            translators,
            chat,
            embedder,
        }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn fetch_page(&self, url: &str, accept_language: &str) -> Result<String, AppError> {
        self.fetcher.fetch_page(url, accept_language).await
    }

    async fn persist_image(&self, article_id: &str, image_url: &str) -> Option<String> {
        self.images.persist(article_id, image_url).await
    }

    fn translators(&self) -> &[Arc<dyn Translator>] {
        &self.translators
    }

    async fn complete_chat(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, AppError> {
        self.chat.complete(system, user, temperature).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.embedder.embed_text(text).await
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        self.embedder.embed_texts(texts).await
    }
}
