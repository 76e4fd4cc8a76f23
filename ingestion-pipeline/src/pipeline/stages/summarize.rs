use common::{error::AppError, storage::types::article::Article};
use tracing::{info, instrument, warn};

use crate::{
    pipeline::{context::StageContext, summary_result::parse_summary_response},
    utils::llm_instructions::{summary_system_prompt, summary_user_message},
};

#[instrument(skip_all, fields(article_id = %ctx.article_id))]
pub async fn summarize(ctx: &StageContext<'_>) -> Result<Article, AppError> {
    let article = ctx.require_article().await?;

    let Some(content) = article
        .translated_content
        .clone()
        .filter(|content| !content.trim().is_empty())
    else {
        let message = format!("Article {} has no translated content", article.id);
        article.record_summary_error(message.clone(), ctx.db).await?;
        return Err(AppError::Precondition(message));
    };

    let title = article
        .translated_title
        .clone()
        .unwrap_or_else(|| article.original_title.clone());
    let system = summary_system_prompt(&article.region_id, &article.category_id);
    let user = summary_user_message(&title, &content);

    let article = article.begin_summary(ctx.db).await?;
    let tuning = &ctx.config.tuning;
    let mut last_error = None;

    for attempt in 1..=tuning.summarize_attempts {
        let outcome = ctx
            .services
            .complete_chat(&system, &user, tuning.summarize_temperature)
            .await
            .and_then(|raw| parse_summary_response(&raw));

        match outcome {
            Ok(summary) => {
                info!(article_id = %article.id, attempt, "summary complete");
                return article.complete_summary(summary, ctx.db).await;
            }
            Err(err) => {
                warn!(article_id = %article.id, attempt, error = %err, "summary attempt failed");
                last_error = Some(err.to_string());
            }
        }
    }

    article
        .record_summary_error(
            last_error.unwrap_or_else(|| "Unknown summarization error".into()),
            ctx.db,
        )
        .await
}
