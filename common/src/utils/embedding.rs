use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use async_openai::{types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{error::AppError, utils::config::AppConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// HTTP embedding sidecar exposing `POST /embed`.
    #[default]
    Remote,
    OpenAI,
    FastEmbed,
    Hashed,
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" | "http" => Ok(Self::Remote),
            "openai" => Ok(Self::OpenAI),
            "hashed" => Ok(Self::Hashed),
            "fastembed" | "fast-embed" | "fast" => Ok(Self::FastEmbed),
            other => Err(anyhow!(
                "unknown embedding backend '{other}'. Expected 'remote', 'openai', 'hashed', or 'fastembed'."
            )),
        }
    }
}

/// Anything able to turn text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, AppError>;

    /// One vector per input, in input order.
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in &texts {
            vectors.push(self.embed_text(text).await?);
        }
        Ok(vectors)
    }
}

#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
}

#[derive(Clone)]
enum EmbeddingInner {
    Remote {
        http: reqwest::Client,
        endpoint: String,
        dimension: usize,
    },
    OpenAI {
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
        dimensions: u32,
    },
    Hashed {
        dimension: usize,
    },
    FastEmbed {
        model: Arc<Mutex<TextEmbedding>>,
        model_name: EmbeddingModel,
        dimension: usize,
    },
}

#[derive(Serialize)]
struct RemoteEmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct RemoteEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddingProvider {
    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::Remote { .. } => "remote",
            EmbeddingInner::Hashed { .. } => "hashed",
            EmbeddingInner::FastEmbed { .. } => "fastembed",
            EmbeddingInner::OpenAI { .. } => "openai",
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::Remote { dimension, .. }
            | EmbeddingInner::Hashed { dimension }
            | EmbeddingInner::FastEmbed { dimension, .. } => *dimension,
            EmbeddingInner::OpenAI { dimensions, .. } => *dimensions as usize,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(vec![text.to_owned()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedding backend returned no vector for input"))
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match &self.inner {
            EmbeddingInner::Remote { http, endpoint, .. } => {
                let response = http
                    .post(endpoint)
                    .json(&RemoteEmbedRequest { texts: &texts })
                    .send()
                    .await
                    .context("calling embedding service")?
                    .error_for_status()
                    .context("embedding service returned an error status")?;

                let body: RemoteEmbedResponse = response
                    .json()
                    .await
                    .context("decoding embedding service response")?;

                if body.embeddings.len() != texts.len() {
                    return Err(anyhow!(
                        "embedding service returned {} vectors for {} inputs",
                        body.embeddings.len(),
                        texts.len()
                    ));
                }
                Ok(body.embeddings)
            }
            EmbeddingInner::Hashed { dimension } => Ok(texts
                .into_iter()
                .map(|text| hashed_embedding(&text, *dimension))
                .collect()),
            EmbeddingInner::FastEmbed { model, .. } => {
                let mut guard = model.lock().await;
                guard
                    .embed(texts, None)
                    .context("generating fastembed batch embeddings")
            }
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model.clone())
                    .input(texts)
                    .dimensions(*dimensions)
                    .build()?;

                let response = client.embeddings().create(request).await?;

                Ok(response
                    .data
                    .into_iter()
                    .map(|item| item.embedding)
                    .collect())
            }
        }
    }

    pub fn new_remote(base_url: &str, dimension: usize, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building embedding http client")?;
        let endpoint = format!("{}/embed", base_url.trim_end_matches('/'));

        Ok(EmbeddingProvider {
            inner: EmbeddingInner::Remote {
                http,
                endpoint,
                dimension: dimension.max(1),
            },
        })
    }

    pub fn new_openai(
        client: Arc<Client<async_openai::config::OpenAIConfig>>,
        model: String,
        dimensions: u32,
    ) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            },
        }
    }

    pub async fn new_fastembed(model_override: Option<String>) -> Result<Self> {
        let model_name = if let Some(code) = model_override {
            EmbeddingModel::from_str(&code).map_err(|err| anyhow!(err))?
        } else {
            EmbeddingModel::AllMiniLML6V2
        };

        let options = TextInitOptions::new(model_name.clone()).with_show_download_progress(true);
        let model_name_for_task = model_name.clone();
        let model_name_code = model_name.to_string();

        let (model, dimension) = tokio::task::spawn_blocking(move || -> Result<_> {
            let model =
                TextEmbedding::try_new(options).context("initialising FastEmbed text model")?;
            let info = EmbeddingModel::get_model_info(&model_name_for_task)
                .ok_or_else(|| anyhow!("FastEmbed model metadata missing for {model_name_code}"))?;
            Ok((model, info.dim))
        })
        .await
        .context("joining FastEmbed initialisation task")??;

        Ok(EmbeddingProvider {
            inner: EmbeddingInner::FastEmbed {
                model: Arc::new(Mutex::new(model)),
                model_name,
                dimension,
            },
        })
    }

    pub fn new_hashed(dimension: usize) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::Hashed {
                dimension: dimension.max(1),
            },
        }
    }

    pub async fn from_config(
        config: &AppConfig,
        openai_client: Option<Arc<Client<async_openai::config::OpenAIConfig>>>,
    ) -> Result<Self> {
        let dimension = config.embedding_dimensions as usize;
        match config.embedding_backend {
            EmbeddingBackend::Remote => Self::new_remote(
                &config.embedder_url,
                dimension,
                Duration::from_millis(config.embedder_timeout_ms),
            ),
            EmbeddingBackend::OpenAI => {
                let client = openai_client
                    .ok_or_else(|| anyhow!("OpenAI embedding backend requires an OpenAI client"))?;
                let model = config
                    .embedding_model
                    .clone()
                    .unwrap_or_else(|| "text-embedding-3-small".to_string());
                Ok(Self::new_openai(client, model, config.embedding_dimensions))
            }
            EmbeddingBackend::FastEmbed => {
                Self::new_fastembed(config.embedding_model.clone()).await
            }
            EmbeddingBackend::Hashed => Ok(Self::new_hashed(dimension)),
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, AppError> {
        debug!(backend = self.backend_label(), chars = text.len(), "embedding text");
        Ok(self.embed(text).await?)
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        debug!(backend = self.backend_label(), count = texts.len(), "embedding batch");
        Ok(self.embed_batch(texts).await?)
    }
}

// Helper functions for hashed embeddings
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    for token in tokens(text) {
        if let Some(slot) = vector.get_mut(bucket(&token, dim)) {
            *slot += 1.0;
        }
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_embeddings_are_normalised_and_deterministic() {
        let provider = EmbeddingProvider::new_hashed(16);
        let first = provider.embed("Tokyo rail strike").await.expect("embed");
        let second = provider.embed("tokyo RAIL strike").await.expect("embed");

        assert_eq!(first.len(), 16);
        assert_eq!(first, second);
        let norm: f32 = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let provider = EmbeddingProvider::new_hashed(8);
        let vectors = provider.embed_batch(Vec::new()).await.expect("batch");
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn batch_through_the_trait_matches_single_calls() {
        let provider = EmbeddingProvider::new_hashed(8);
        let embedder: &dyn Embedder = &provider;
        let vectors = embedder
            .embed_texts(vec!["Manila flood".into(), "Taipei metro".into()])
            .await
            .expect("batch");
        assert_eq!(vectors.len(), 2);
        assert_eq!(
            vectors[1],
            embedder.embed_text("Taipei metro").await.expect("single")
        );
    }

    #[test]
    fn backend_parses_aliases() {
        assert_eq!(
            "HTTP".parse::<EmbeddingBackend>().expect("parse"),
            EmbeddingBackend::Remote
        );
        assert_eq!(
            "fast-embed".parse::<EmbeddingBackend>().expect("parse"),
            EmbeddingBackend::FastEmbed
        );
        assert!("word2vec".parse::<EmbeddingBackend>().is_err());
    }
}
