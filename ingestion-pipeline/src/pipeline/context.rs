use common::{
    error::AppError,
    queue::names::Stage,
    storage::{db::SurrealDbClient, types::article::Article},
};
use tracing::error;

use super::{config::PipelineConfig, services::PipelineServices};

pub struct StageContext<'a> {
    pub article_id: &'a str,
    pub stage: Stage,
    pub db: &'a SurrealDbClient,
    pub config: &'a PipelineConfig,
    pub services: &'a dyn PipelineServices,
}

impl<'a> StageContext<'a> {
    pub fn new(
        article_id: &'a str,
        stage: Stage,
        db: &'a SurrealDbClient,
        config: &'a PipelineConfig,
        services: &'a dyn PipelineServices,
    ) -> Self {
        Self {
            article_id,
            stage,
            db,
            config,
            services,
        }
    }

    pub async fn load_article(&self) -> Result<Option<Article>, AppError> {
        Ok(self.db.get_item::<Article>(self.article_id).await?)
    }

    pub async fn require_article(&self) -> Result<Article, AppError> {
        self.load_article()
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Article {} not found", self.article_id)))
    }

    pub fn abort(&self, err: AppError) -> AppError {
        error!(
            article_id = %self.article_id,
            stage = self.stage.as_str(),
            error = %err,
            "pipeline stage aborted"
        );
        err
    }
}
