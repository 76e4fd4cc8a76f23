use common::{error::AppError, storage::types::article::Article, utils::text::char_len};
use tracing::{debug, info, instrument, warn};

use crate::{
    pipeline::context::StageContext,
    utils::html_extraction::{extract_readable, find_lead_image},
};

/// Enriches an article from its original page. Never fails because of the page itself:
/// fetch and extraction problems leave the feed-provided content in place.
///
/// Returns `None` when the article no longer exists.
#[instrument(skip_all, fields(article_id = %ctx.article_id))]
pub async fn scrape(ctx: &StageContext<'_>) -> Result<Option<Article>, AppError> {
    let Some(mut article) = ctx.load_article().await? else {
        warn!(article_id = %ctx.article_id, "article not found; skipping scrape");
        return Ok(None);
    };

    if !ctx.config.scrape_enabled {
        debug!(article_id = %article.id, "scraping disabled");
        return Ok(Some(article));
    }

    let html = match ctx
        .services
        .fetch_page(&article.original_url, &article.source_language)
        .await
    {
        Ok(html) => html,
        Err(err) => {
            warn!(
                article_id = %article.id,
                url = %article.original_url,
                error = %err,
                "scrape failed; using feed content"
            );
            return Ok(Some(article));
        }
    };

    let extracted = match extract_readable(&html, &article.original_url) {
        Ok(Some(extracted)) => extracted,
        Ok(None) => {
            warn!(article_id = %article.id, "readability extracted nothing");
            return Ok(Some(article));
        }
        Err(err) => {
            warn!(article_id = %article.id, error = %err, "readability extraction failed");
            return Ok(Some(article));
        }
    };

    let original_len = char_len(&article.original_content);
    let scraped_len = char_len(&extracted.text);
    if scraped_len > original_len && scraped_len >= ctx.config.scrape_min_length {
        article = article
            .replace_original_content(extracted.text.clone(), ctx.db)
            .await?;
        info!(article_id = %article.id, original_len, scraped_len, "replaced content");
    } else {
        debug!(article_id = %article.id, original_len, scraped_len, "kept original content");
    }

    if article.image_url.is_none() {
        let candidate = find_lead_image(&html, Some(&extracted.html), &article.original_url);
        if let Some(image_url) = candidate {
            if let Some(stored) = ctx.services.persist_image(&article.id, &image_url).await {
                article = article.set_image_url(stored, ctx.db).await?;
            }
        }
    }

    Ok(Some(article))
}
