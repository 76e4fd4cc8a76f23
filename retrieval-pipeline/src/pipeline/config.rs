use std::fmt;

use common::error::AppError;
use serde::{Deserialize, Serialize};

use crate::scoring::DEFAULT_RRF_K;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// BM25 over the search document.
    Keyword,
    /// Cosine similarity against stored article vectors.
    Semantic,
    /// Keyword and semantic candidates fused with reciprocal rank fusion.
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(AppError::Validation(format!("unknown search mode '{other}'"))),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    #[default]
    Relevance,
    Newest,
    Oldest,
}

impl SearchSort {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchSort::Relevance => "relevance",
            SearchSort::Newest => "newest",
            SearchSort::Oldest => "oldest",
        }
    }
}

impl std::str::FromStr for SearchSort {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relevance" => Ok(Self::Relevance),
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            other => Err(AppError::Validation(format!("unknown sort '{other}'"))),
        }
    }
}

/// Tunable parameters of the search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchTuning {
    /// Candidates taken from each list before fusion.
    pub candidate_limit: usize,
    pub rrf_k: f32,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            candidate_limit: 100,
            rrf_k: DEFAULT_RRF_K,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl SearchTuning {
    /// 1-based page and a page size within bounds; a zero size means the default.
    pub fn normalize_paging(&self, page: usize, page_size: usize) -> (usize, usize) {
        let page = page.max(1);
        let page_size = if page_size == 0 {
            self.default_page_size
        } else {
            page_size.min(self.max_page_size)
        };
        (page, page_size)
    }
}
