use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use common::{
    queue::names::Stage,
    storage::types::{article::Article, job::Job, stage_status::TranslationProvider},
};
use ingestion_pipeline::{
    backfill_embeddings, requeue_pending, requeue_stage, BackfillReport, RequeueReport, SyncReport,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedResponse {
    pub status: &'static str,
    pub job_id: String,
    pub queue: String,
}

impl From<Job> for QueuedResponse {
    fn from(job: Job) -> Self {
        Self {
            status: "queued",
            job_id: job.id,
            queue: job.queue,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TranslateParams {
    pub provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequeuePendingParams {
    pub region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillParams {
    pub batch_size: Option<usize>,
}

/// Runs one feed sync inline.
pub async fn sync_articles(State(state): State<ApiState>) -> Result<Json<SyncReport>, ApiError> {
    let report = state.sync.run().await?;
    info!(
        created = report.created,
        skipped = report.skipped,
        failed = report.failed,
        "manual sync finished"
    );
    Ok(Json(report))
}

/// Puts every article still pending translation back on its scrape queue.
pub async fn requeue_pending_articles(
    State(state): State<ApiState>,
    Query(params): Query<RequeuePendingParams>,
) -> Result<Json<RequeueReport>, ApiError> {
    let region = params
        .region
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty());
    let report = requeue_pending(&state.queue, region).await?;
    Ok(Json(report))
}

pub async fn backfill_article_embeddings(
    State(state): State<ApiState>,
    Query(params): Query<BackfillParams>,
) -> Result<Json<BackfillReport>, ApiError> {
    let report = backfill_embeddings(&state.pipeline, params.batch_size.unwrap_or_default()).await?;
    Ok(Json(report))
}

async fn requeue(state: &ApiState, id: &str, stage: Stage) -> Result<Json<QueuedResponse>, ApiError> {
    let job = requeue_stage(&state.queue, id, stage).await?;
    Ok(Json(job.into()))
}

pub async fn rescrape_article(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<QueuedResponse>, ApiError> {
    requeue(&state, &id, Stage::Scrape).await
}

pub async fn resummarize_article(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<QueuedResponse>, ApiError> {
    requeue(&state, &id, Stage::Summarize).await
}

pub async fn reembed_article(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<QueuedResponse>, ApiError> {
    requeue(&state, &id, Stage::Embed).await
}

/// With `?provider=` the translation runs inline on that provider and the updated article is
/// returned; otherwise the article goes back on the translate queue.
pub async fn retranslate_article(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<TranslateParams>,
) -> Result<Response, ApiError> {
    let provider = params
        .provider
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty());

    match provider {
        Some(raw) => {
            let provider: TranslationProvider = raw.parse()?;
            let mut article: Article = state.pipeline.force_translate(&id, provider).await?;
            article.embedding = None;
            Ok(Json(article).into_response())
        }
        None => Ok(requeue(&state, &id, Stage::Translate).await?.into_response()),
    }
}
