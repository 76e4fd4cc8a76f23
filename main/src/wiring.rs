use std::sync::Arc;

use api_router::{
    api_routes_v1,
    api_state::{ApiState, FeedReaderProbe, LibreTranslateProbe},
};
use axum::Router;
use common::{
    clients::{
        chat::openai_client, FeedReader, HttpWebFetcher, LibreTranslateClient, LlmTranslator,
        MinifluxClient, OpenAiChat, Translator,
    },
    queue::JobQueue,
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{
        config::AppConfig,
        embedding::{Embedder, EmbeddingProvider},
    },
};
use ingestion_pipeline::{
    ContentPipeline, DefaultPipelineServices, FeedSync, ImageStore, PipelineConfig,
};
use retrieval_pipeline::SearchEngine;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

/// Everything the binaries share, built once from config.
pub struct AppServices {
    pub config: AppConfig,
    pub queue: Arc<JobQueue>,
    pub pipeline: Arc<ContentPipeline>,
    pub sync: Arc<FeedSync>,
    pub search: Arc<SearchEngine>,
    pub reader: Arc<MinifluxClient>,
    pub libretranslate: LibreTranslateClient,
}

impl AppServices {
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );
        Self::with_db(config, db).await
    }

    pub async fn with_db(config: AppConfig, db: Arc<SurrealDbClient>) -> anyhow::Result<Self> {
        // Defines the search analyzers and indexes before anything reads or writes.
        let queue = JobQueue::connect(Arc::clone(&db)).await?;

        let openai_client = Arc::new(openai_client(&config)?);
        let chat = Arc::new(OpenAiChat::new(Arc::clone(&openai_client), &config.llm_model));
        let libretranslate = LibreTranslateClient::from_config(&config)?;
        let translators: Vec<Arc<dyn Translator>> = vec![
            Arc::new(libretranslate.clone()),
            Arc::new(LlmTranslator::new(Arc::clone(&chat) as _)),
        ];

        let embedding_provider =
            Arc::new(EmbeddingProvider::from_config(&config, Some(openai_client)).await?);
        info!(
            embedding_backend = embedding_provider.backend_label(),
            embedding_dimension = embedding_provider.dimension(),
            "Embedding provider initialized"
        );

        let storage = StorageManager::new(&config).await?;
        let fetcher = Arc::new(HttpWebFetcher::from_config(&config)?);
        let images = Arc::new(ImageStore::new(Arc::clone(&fetcher) as _, storage));

        let services = Arc::new(DefaultPipelineServices::new(
            fetcher,
            Arc::clone(&images) as _,
            translators,
            chat,
            Arc::clone(&embedding_provider) as _,
        ));
        let pipeline = Arc::new(ContentPipeline::new(
            Arc::clone(&db),
            PipelineConfig::from_app_config(&config),
            services,
        ));

        let reader = Arc::new(MinifluxClient::from_config(&config)?);
        let sync = Arc::new(FeedSync::new(
            Arc::clone(&queue),
            Arc::clone(&reader) as _,
            images,
            usize::try_from(config.sync_batch_size).unwrap_or(usize::MAX),
        ));
        let embedder: Arc<dyn Embedder> = embedding_provider;
        let search = Arc::new(SearchEngine::new(db, Some(embedder)));

        Ok(Self {
            config,
            queue,
            pipeline,
            sync,
            search,
            reader,
            libretranslate,
        })
    }

    pub fn api_state(&self) -> ApiState {
        let reader: Arc<dyn FeedReader> = Arc::clone(&self.reader) as _;
        ApiState::new(
            &self.config,
            Arc::clone(&self.queue),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.sync),
            Arc::clone(&self.search),
        )
        .with_probe(Arc::new(FeedReaderProbe(reader)))
        .with_probe(Arc::new(LibreTranslateProbe(self.libretranslate.clone())))
    }
}

/// The versioned API with request tracing and response compression.
pub fn build_app(api_state: &ApiState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes_v1(api_state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(api_state.clone())
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
