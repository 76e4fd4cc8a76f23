use common::{error::AppError, storage::types::article::Article, utils::text::truncate_chars};
use tracing::{info, instrument};

use crate::pipeline::context::StageContext;

/// Single embedding call. Failures are recorded and returned so the queue redelivers.
#[instrument(skip_all, fields(article_id = %ctx.article_id))]
pub async fn embed(ctx: &StageContext<'_>) -> Result<Article, AppError> {
    let article = ctx.require_article().await?;
    let source = article.embedding_source();
    let text = truncate_chars(&source, ctx.config.tuning.embed_max_chars).to_owned();

    let article = article.begin_embedding(ctx.db).await?;
    match ctx.services.embed(&text).await {
        Ok(vector) => {
            info!(article_id = %article.id, dimension = vector.len(), "embedding stored");
            article.complete_embedding(vector, ctx.db).await
        }
        Err(err) => {
            article
                .record_embedding_error(err.to_string(), ctx.db)
                .await?;
            Err(err)
        }
    }
}
