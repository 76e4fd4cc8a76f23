use common::{
    clients::Translator,
    error::AppError,
    storage::types::{article::Article, stage_status::TranslationProvider},
};
use tracing::{info, instrument, warn};

use crate::pipeline::context::StageContext;

async fn translate_text(
    translator: &dyn Translator,
    text: &str,
    source: &str,
    target: &str,
) -> Result<String, AppError> {
    if text.trim().is_empty() {
        return Ok(String::new());
    }
    translator.translate(text, source, target).await
}

/// Title and content are translated concurrently; either failing fails the attempt.
async fn translate_fields(
    translator: &dyn Translator,
    article: &Article,
    target: &str,
) -> Result<(String, String), AppError> {
    let source = article.source_language.as_str();
    futures::try_join!(
        translate_text(translator, &article.original_title, source, target),
        translate_text(translator, &article.original_content, source, target),
    )
}

/// Translates with provider fallback under a shared attempt budget.
///
/// Exhausting the budget is not an error for the caller: the article comes back with its
/// translation status set to `error`.
#[instrument(skip_all, fields(article_id = %ctx.article_id))]
pub async fn translate(ctx: &StageContext<'_>) -> Result<Article, AppError> {
    let article = ctx.require_article().await?;
    let target = ctx.config.target_language.as_str();

    if article.source_language.eq_ignore_ascii_case(target) {
        let article = article.begin_translation(ctx.db).await?;
        let title = article.original_title.clone();
        let content = article.original_content.clone();
        info!(article_id = %article.id, "source already in target language; passing through");
        return article
            .complete_translation(title, content, TranslationProvider::Passthrough, ctx.db)
            .await;
    }

    let article = article.begin_translation(ctx.db).await?;
    let translators = ctx.services.translators();
    if translators.is_empty() {
        return article
            .record_translation_error("No translation providers configured".into(), ctx.db)
            .await;
    }

    let mut last_error = None;
    let budget = ctx.config.tuning.translate_attempts;
    for (attempt, translator) in translators.iter().cycle().take(budget).enumerate() {
        let provider = translator.provider();
        match translate_fields(translator.as_ref(), &article, target).await {
            Ok((title, content)) => {
                info!(
                    article_id = %article.id,
                    provider = provider.as_str(),
                    attempt = attempt + 1,
                    "translation complete"
                );
                return article
                    .complete_translation(title, content, provider, ctx.db)
                    .await;
            }
            Err(err) => {
                warn!(
                    article_id = %article.id,
                    provider = provider.as_str(),
                    attempt = attempt + 1,
                    error = %err,
                    "translation attempt failed"
                );
                last_error = Some(err.to_string());
            }
        }
    }

    article
        .record_translation_error(
            last_error.unwrap_or_else(|| "Unknown translation error".into()),
            ctx.db,
        )
        .await
}

/// Translates with one pinned provider and no fallback. Failures are recorded and returned.
#[instrument(skip_all, fields(article_id = %ctx.article_id, provider = provider.as_str()))]
pub async fn force_translate(
    ctx: &StageContext<'_>,
    provider: TranslationProvider,
) -> Result<Article, AppError> {
    let translator = ctx
        .services
        .translators()
        .iter()
        .find(|translator| translator.provider() == provider)
        .cloned()
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Translation provider '{}' is not available",
                provider.as_str()
            ))
        })?;

    let article = ctx.require_article().await?.begin_translation(ctx.db).await?;

    match translate_fields(translator.as_ref(), &article, &ctx.config.target_language).await {
        Ok((title, content)) => {
            article
                .complete_translation(title, content, provider, ctx.db)
                .await
        }
        Err(err) => {
            article
                .record_translation_error(err.to_string(), ctx.db)
                .await?;
            Err(err)
        }
    }
}
