mod config;

pub use config::{SearchMode, SearchSort, SearchTuning};

use std::{sync::Arc, time::Instant};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::article::Article},
    utils::embedding::Embedder,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    filters::SearchFilters,
    fts::{keyword_candidates, keyword_page},
    rows::fetch_in_order,
    scoring::reciprocal_rank_fusion,
    vector::{semantic_candidates, semantic_page},
};

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub sort: SearchSort,
    /// 1-based.
    pub page: usize,
    /// Zero selects the default page size.
    pub page_size: usize,
    pub filters: SearchFilters,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub data: Vec<Article>,
    pub total: u64,
    pub page: usize,
    pub page_size: usize,
}

/// Keyword, semantic and hybrid search over articles.
///
/// Without an embedder, or when embedding the query fails, every mode answers with keyword
/// results.
pub struct SearchEngine {
    db: Arc<SurrealDbClient>,
    embedder: Option<Arc<dyn Embedder>>,
    tuning: SearchTuning,
}

struct PageWindow {
    page: usize,
    page_size: usize,
}

impl PageWindow {
    fn start(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

impl SearchEngine {
    pub fn new(db: Arc<SurrealDbClient>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            db,
            embedder,
            tuning: SearchTuning::default(),
        }
    }

    #[must_use]
    pub fn with_tuning(mut self, tuning: SearchTuning) -> Self {
        self.tuning = tuning;
        self
    }

    #[instrument(skip_all, fields(mode = request.mode.as_str(), sort = request.sort.as_str()))]
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchPage, AppError> {
        let terms = request.query.trim();
        if terms.is_empty() {
            return Err(AppError::Validation(
                "Query parameter \"q\" is required".into(),
            ));
        }

        let (page, page_size) = self
            .tuning
            .normalize_paging(request.page, request.page_size);
        let window = PageWindow { page, page_size };
        let started = Instant::now();

        let (data, total, effective) = match (request.mode, request.sort) {
            (SearchMode::Keyword, _) | (_, SearchSort::Newest | SearchSort::Oldest) => {
                let (data, total) = self.keyword(terms, request, &window).await?;
                (data, total, SearchMode::Keyword)
            }
            (mode, SearchSort::Relevance) => match self.embed_query(terms).await {
                Some(embedding) if mode == SearchMode::Semantic => {
                    let (data, total) = semantic_page(
                        &self.db,
                        &embedding,
                        &request.filters,
                        window.page_size,
                        window.start(),
                    )
                    .await?;
                    (data, total, SearchMode::Semantic)
                }
                Some(embedding) => {
                    let (data, total) = self.hybrid(terms, &embedding, request, &window).await?;
                    (data, total, SearchMode::Hybrid)
                }
                None => {
                    let (data, total) = self.keyword(terms, request, &window).await?;
                    (data, total, SearchMode::Keyword)
                }
            },
        };

        info!(
            requested = request.mode.as_str(),
            effective = effective.as_str(),
            total,
            returned = data.len(),
            page,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "search finished"
        );

        Ok(SearchPage {
            data,
            total,
            page,
            page_size,
        })
    }

    async fn keyword(
        &self,
        terms: &str,
        request: &SearchRequest,
        window: &PageWindow,
    ) -> Result<(Vec<Article>, u64), AppError> {
        keyword_page(
            &self.db,
            terms,
            &request.filters,
            request.sort,
            window.page_size,
            window.start(),
        )
        .await
    }

    /// `None` means "answer with keyword search"; the failure is only logged.
    async fn embed_query(&self, terms: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed_text(terms).await {
            Ok(embedding) if !embedding.is_empty() => Some(embedding),
            Ok(_) => {
                warn!("embedder returned an empty vector; falling back to keyword search");
                None
            }
            Err(err) => {
                warn!(error = %err, "query embedding failed; falling back to keyword search");
                None
            }
        }
    }

    async fn hybrid(
        &self,
        terms: &str,
        embedding: &[f32],
        request: &SearchRequest,
        window: &PageWindow,
    ) -> Result<(Vec<Article>, u64), AppError> {
        let limit = self.tuning.candidate_limit;
        let (keyword, semantic) = futures::try_join!(
            keyword_candidates(&self.db, terms, &request.filters, limit),
            semantic_candidates(&self.db, embedding, &request.filters, limit),
        )?;

        let fused = reciprocal_rank_fusion(&keyword, &semantic, self.tuning.rrf_k);
        let total = u64::try_from(fused.len()).unwrap_or(u64::MAX);
        let page_ids: Vec<String> = fused
            .into_iter()
            .skip(window.start())
            .take(window.page_size)
            .map(|candidate| candidate.id)
            .collect();

        info!(
            keyword = keyword.len(),
            semantic = semantic.len(),
            fused = total,
            "hybrid candidates fused"
        );

        let data = fetch_in_order(&self.db, &page_ids).await?;
        Ok((data, total))
    }
}
