use std::collections::BTreeMap;

use common::{
    error::AppError,
    queue::{names::Stage, JobQueue},
    storage::{
        db::SurrealDbClient,
        types::{
            article::Article,
            job::{Job, JobPayload},
        },
    },
    utils::text::truncate_chars,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::pipeline::ContentPipeline;

/// Batch size used by [`backfill_embeddings`] when the caller passes zero.
pub const DEFAULT_BACKFILL_BATCH: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequeueReport {
    pub enqueued: usize,
    pub by_region: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub total: usize,
    pub embedded: usize,
    pub failed: usize,
}

/// Resets `stage` on an article and enqueues it again on the article's regional queue.
pub async fn requeue_stage(
    queue: &JobQueue,
    article_id: &str,
    stage: Stage,
) -> Result<Job, AppError> {
    let db = queue.db();
    let article = db
        .get_item::<Article>(article_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Article {article_id} not found")))?;

    let article = article.reset_stage(stage, db).await?;
    let queue_name = stage.queue(&article.region_id);
    let job = queue
        .send(&queue_name, JobPayload::article(article.id.clone()))
        .await?;

    info!(%article_id, queue = %queue_name, job_id = %job.id, "stage requeued");
    Ok(job)
}

/// Sends every article still waiting for translation back to its regional scrape queue.
///
/// Recovers articles that were persisted by a sync whose enqueue never happened.
pub async fn requeue_pending(
    queue: &JobQueue,
    region_id: Option<&str>,
) -> Result<RequeueReport, AppError> {
    let pending = Article::list_translation_pending(region_id, queue.db()).await?;
    let mut report = RequeueReport::default();

    for article in pending {
        queue
            .send(
                &Stage::Scrape.queue(&article.region_id),
                JobPayload::article(article.id.clone()),
            )
            .await?;
        *report.by_region.entry(article.region_id).or_default() += 1;
        report.enqueued += 1;
    }

    info!(enqueued = report.enqueued, by_region = ?report.by_region, "pending articles requeued");
    Ok(report)
}

/// Embeds summarized articles that have no vector yet, `batch_size` texts per embedder call.
///
/// A failed batch marks its articles as embedding errors and the run moves on to the next one.
pub async fn backfill_embeddings(
    pipeline: &ContentPipeline,
    batch_size: usize,
) -> Result<BackfillReport, AppError> {
    let batch_size = if batch_size == 0 {
        DEFAULT_BACKFILL_BATCH
    } else {
        batch_size
    };
    let db = pipeline.db().as_ref();
    let max_chars = pipeline.config().tuning.embed_max_chars;

    let candidates = Article::list_missing_embeddings(db).await?;
    let mut report = BackfillReport {
        total: candidates.len(),
        ..BackfillReport::default()
    };

    for batch in candidates.chunks(batch_size) {
        let texts = batch
            .iter()
            .map(|article| truncate_chars(&article.embedding_source(), max_chars).to_owned())
            .collect();

        let vectors = match pipeline.services().embed_batch(texts).await {
            Ok(vectors) if vectors.len() == batch.len() => vectors,
            Ok(vectors) => {
                let message = format!(
                    "Embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                );
                report.failed += record_batch_error(batch, &message, db).await?;
                continue;
            }
            Err(err) => {
                warn!(size = batch.len(), error = %err, "embedding batch failed");
                report.failed += record_batch_error(batch, &err.to_string(), db).await?;
                continue;
            }
        };

        for (article, vector) in batch.iter().zip(vectors) {
            article
                .begin_embedding(db)
                .await?
                .complete_embedding(vector, db)
                .await?;
            report.embedded += 1;
        }
    }

    info!(
        total = report.total,
        embedded = report.embedded,
        failed = report.failed,
        "embedding backfill finished"
    );
    Ok(report)
}

async fn record_batch_error(
    batch: &[Article],
    message: &str,
    db: &SurrealDbClient,
) -> Result<usize, AppError> {
    for article in batch {
        article.record_embedding_error(message.to_owned(), db).await?;
    }
    Ok(batch.len())
}
