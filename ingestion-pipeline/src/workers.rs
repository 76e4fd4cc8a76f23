use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    queue::{
        names::{Stage, SYNC},
        JobHandler, JobQueue, WorkOptions,
    },
    storage::types::{
        job::{Job, JobPayload},
        stage_status::{SummaryStatus, TranslationStatus},
    },
    utils::config::AppConfig,
};
use tracing::{debug, info, instrument};

use crate::{pipeline::ContentPipeline, sync::FeedSync};

/// Runs one stage for the article referenced by a job and hands it to the next stage.
pub struct StageHandler {
    stage: Stage,
    pipeline: Arc<ContentPipeline>,
    queue: Arc<JobQueue>,
}

impl StageHandler {
    pub fn new(stage: Stage, pipeline: Arc<ContentPipeline>, queue: Arc<JobQueue>) -> Self {
        Self {
            stage,
            pipeline,
            queue,
        }
    }

    async fn advance(&self, next: Stage, region_id: &str, article_id: &str) -> Result<(), AppError> {
        let queue_name = next.queue(region_id);
        self.queue
            .send(&queue_name, JobPayload::article(article_id))
            .await?;
        debug!(%article_id, queue = %queue_name, "advanced to next stage");
        Ok(())
    }
}

#[async_trait]
impl JobHandler for StageHandler {
    #[instrument(skip_all, fields(stage = self.stage.as_str(), job_id = %job.id))]
    async fn handle(&self, job: &Job) -> Result<(), AppError> {
        let article_id = job.payload.article_id().ok_or_else(|| {
            AppError::Validation(format!(
                "{} job {} has no article id",
                self.stage.as_str(),
                job.id
            ))
        })?;

        match self.stage {
            Stage::Scrape => {
                if let Some(article) = self.pipeline.scrape(article_id).await? {
                    self.advance(Stage::Translate, &article.region_id, &article.id)
                        .await?;
                }
            }
            Stage::Translate => {
                let article = self.pipeline.translate(article_id).await?;
                if article.translation_status == TranslationStatus::Complete {
                    self.advance(Stage::Summarize, &article.region_id, &article.id)
                        .await?;
                }
            }
            Stage::Summarize => {
                let article = self.pipeline.summarize(article_id).await?;
                if article.summary_status == SummaryStatus::Complete
                    && self.pipeline.config().embed_enabled
                {
                    self.advance(Stage::Embed, &article.region_id, &article.id)
                        .await?;
                }
            }
            Stage::Embed => {
                self.pipeline.embed(article_id).await?;
            }
        }
        Ok(())
    }
}

pub struct SyncHandler {
    sync: Arc<FeedSync>,
}

impl SyncHandler {
    pub fn new(sync: Arc<FeedSync>) -> Self {
        Self { sync }
    }
}

#[async_trait]
impl JobHandler for SyncHandler {
    async fn handle(&self, _job: &Job) -> Result<(), AppError> {
        self.sync.run().await.map(|_| ())
    }
}

fn stage_concurrency(stage: Stage, config: &AppConfig) -> usize {
    match stage {
        Stage::Scrape => config.scrape_concurrency,
        Stage::Translate => config.translate_concurrency,
        Stage::Summarize => config.summarize_concurrency,
        Stage::Embed => config.embed_concurrency,
    }
}

/// Registers the sync worker and one worker pool per (region, stage) queue.
pub async fn register_workers(
    queue: &Arc<JobQueue>,
    pipeline: Arc<ContentPipeline>,
    sync: Arc<FeedSync>,
    config: &AppConfig,
) -> Result<(), AppError> {
    queue
        .work(
            SYNC,
            WorkOptions::with_concurrency(1),
            Arc::new(SyncHandler::new(sync)),
        )
        .await?;

    for region in &config.regions {
        for stage in Stage::ALL {
            if stage == Stage::Embed && !pipeline.config().embed_enabled {
                continue;
            }
            let handler = Arc::new(StageHandler::new(
                stage,
                Arc::clone(&pipeline),
                Arc::clone(queue),
            ));
            queue
                .work(
                    &stage.queue(region),
                    WorkOptions::with_concurrency(stage_concurrency(stage, config)),
                    handler,
                )
                .await?;
        }
    }

    info!(regions = ?config.regions, "pipeline workers registered");
    Ok(())
}

/// Registers the periodic sync, starts the scheduler and triggers one sync right away.
pub async fn start_schedules(queue: &JobQueue, config: &AppConfig) -> Result<(), AppError> {
    queue.schedule(SYNC, &config.sync_cron(), JobPayload::Sync).await?;
    queue.start().await?;

    match queue.send_singleton(SYNC, JobPayload::Sync).await? {
        Some(job) => info!(job_id = %job.id, "initial sync enqueued"),
        None => debug!("sync already pending; skipping initial enqueue"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use common::storage::types::{article::Article, stage_status::TranslationProvider};

    use super::*;
    use crate::pipeline::{
        tests::{setup_db, store_article, MockServices, ScriptedTranslator, VALID_SUMMARY},
        PipelineConfig, PipelineServices,
    };
    use common::clients::Translator;

    async fn handler_for(
        stage: Stage,
        services: MockServices,
        config: PipelineConfig,
    ) -> (StageHandler, Arc<JobQueue>) {
        let db = setup_db().await;
        let queue = JobQueue::connect(Arc::clone(&db)).await.expect("queue");
        let services: Arc<dyn PipelineServices> = Arc::new(services);
        let pipeline = Arc::new(ContentPipeline::new(db, config, services));
        (StageHandler::new(stage, pipeline, Arc::clone(&queue)), queue)
    }

    fn article_job(stage: Stage, region: &str, article_id: &str) -> Job {
        Job::new(stage.queue(region), JobPayload::article(article_id))
    }

    #[tokio::test]
    async fn scrape_advances_to_translate_on_same_region() {
        let (handler, queue) =
            handler_for(Stage::Scrape, MockServices::new(), PipelineConfig::default()).await;
        let article = store_article(queue.db(), "ph", "tl", "Nilalaman").await;

        handler
            .handle(&article_job(Stage::Scrape, "ph", &article.id))
            .await
            .expect("scrape");
        assert_eq!(queue.queue_depth("translate-ph").await.expect("depth"), 1);
    }

    #[tokio::test]
    async fn scrape_of_missing_article_stops_quietly() {
        let (handler, queue) =
            handler_for(Stage::Scrape, MockServices::new(), PipelineConfig::default()).await;

        handler
            .handle(&article_job(Stage::Scrape, "jp", "gone"))
            .await
            .expect("missing article is not an error");
        assert_eq!(queue.queue_depth("translate-jp").await.expect("depth"), 0);
    }

    #[tokio::test]
    async fn failed_translation_does_not_advance() {
        let llm = ScriptedTranslator::failing(TranslationProvider::Llm, "down");
        let services =
            MockServices::new().with_translators(vec![llm as Arc<dyn Translator>]);
        let (handler, queue) =
            handler_for(Stage::Translate, services, PipelineConfig::default()).await;
        let article = store_article(queue.db(), "jp", "ja", "本文").await;

        handler
            .handle(&article_job(Stage::Translate, "jp", &article.id))
            .await
            .expect("exhaustion completes the job");

        let stored = queue
            .db()
            .get_item::<Article>(&article.id)
            .await
            .expect("query")
            .expect("article");
        assert_eq!(stored.translation_status, TranslationStatus::Error);
        assert_eq!(queue.queue_depth("summarize-jp").await.expect("depth"), 0);
        assert_eq!(queue.queue_depth("embed-jp").await.expect("depth"), 0);
    }

    #[tokio::test]
    async fn translation_then_summary_chain_respects_embed_toggle() {
        let libre = ScriptedTranslator::ok(TranslationProvider::LibreTranslate);
        let services = MockServices::new()
            .with_translators(vec![libre as Arc<dyn Translator>])
            .with_chat(vec![Ok(VALID_SUMMARY.into())]);
        let config = PipelineConfig {
            embed_enabled: false,
            ..PipelineConfig::default()
        };
        let (translate, queue) = handler_for(Stage::Translate, services, config).await;
        let article = store_article(queue.db(), "tw", "zh", "內容").await;

        translate
            .handle(&article_job(Stage::Translate, "tw", &article.id))
            .await
            .expect("translate");
        assert_eq!(queue.queue_depth("summarize-tw").await.expect("depth"), 1);

        let summarize = StageHandler::new(
            Stage::Summarize,
            Arc::clone(&translate.pipeline),
            Arc::clone(&queue),
        );
        summarize
            .handle(&article_job(Stage::Summarize, "tw", &article.id))
            .await
            .expect("summarize");
        assert_eq!(queue.queue_depth("embed-tw").await.expect("depth"), 0);
    }

    #[tokio::test]
    async fn job_without_article_is_rejected() {
        let (handler, _queue) =
            handler_for(Stage::Embed, MockServices::new(), PipelineConfig::default()).await;
        let err = handler
            .handle(&Job::new("embed-jp", JobPayload::Sync))
            .await
            .expect_err("sync payload on a stage queue");
        assert!(matches!(err, AppError::Validation(_)));
    }
}
