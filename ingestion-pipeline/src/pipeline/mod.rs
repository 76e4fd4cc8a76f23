mod config;
mod context;
mod services;
mod stages;
mod summary_result;

pub use config::{PipelineConfig, PipelineTuning};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};
pub use summary_result::parse_summary_response;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    queue::names::Stage,
    storage::{
        db::SurrealDbClient,
        types::{article::Article, stage_status::TranslationProvider},
    },
};
use tracing::info;

use self::context::StageContext;

/// The four per-article stages. Each entry point loads the article by id, so a stage can be
/// re-run at any time.
pub struct ContentPipeline {
    db: Arc<SurrealDbClient>,
    config: PipelineConfig,
    services: Arc<dyn PipelineServices>,
}

impl ContentPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: PipelineConfig,
        services: Arc<dyn PipelineServices>,
    ) -> Self {
        Self {
            db,
            config,
            services,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn db(&self) -> &Arc<SurrealDbClient> {
        &self.db
    }

    pub(crate) fn services(&self) -> &dyn PipelineServices {
        self.services.as_ref()
    }

    fn context<'a>(&'a self, article_id: &'a str, stage: Stage) -> StageContext<'a> {
        StageContext::new(
            article_id,
            stage,
            self.db.as_ref(),
            &self.config,
            self.services.as_ref(),
        )
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// `Ok(None)` when the article does not exist.
    pub async fn scrape(&self, article_id: &str) -> Result<Option<Article>, AppError> {
        let ctx = self.context(article_id, Stage::Scrape);
        let started = Instant::now();
        let article = stages::scrape(&ctx).await.map_err(|err| ctx.abort(err))?;
        info!(
            %article_id,
            found = article.is_some(),
            total_ms = Self::duration_millis(started.elapsed()),
            "scrape finished"
        );
        Ok(article)
    }

    pub async fn translate(&self, article_id: &str) -> Result<Article, AppError> {
        let ctx = self.context(article_id, Stage::Translate);
        let started = Instant::now();
        let article = stages::translate(&ctx).await.map_err(|err| ctx.abort(err))?;
        info!(
            %article_id,
            status = article.translation_status.as_str(),
            total_ms = Self::duration_millis(started.elapsed()),
            "translate finished"
        );
        Ok(article)
    }

    pub async fn force_translate(
        &self,
        article_id: &str,
        provider: TranslationProvider,
    ) -> Result<Article, AppError> {
        let ctx = self.context(article_id, Stage::Translate);
        stages::force_translate(&ctx, provider)
            .await
            .map_err(|err| ctx.abort(err))
    }

    pub async fn summarize(&self, article_id: &str) -> Result<Article, AppError> {
        let ctx = self.context(article_id, Stage::Summarize);
        let started = Instant::now();
        let article = stages::summarize(&ctx).await.map_err(|err| ctx.abort(err))?;
        info!(
            %article_id,
            status = article.summary_status.as_str(),
            total_ms = Self::duration_millis(started.elapsed()),
            "summarize finished"
        );
        Ok(article)
    }

    pub async fn embed(&self, article_id: &str) -> Result<Article, AppError> {
        let ctx = self.context(article_id, Stage::Embed);
        let started = Instant::now();
        let article = stages::embed(&ctx).await.map_err(|err| ctx.abort(err))?;
        info!(
            %article_id,
            total_ms = Self::duration_millis(started.elapsed()),
            "embed finished"
        );
        Ok(article)
    }
}
