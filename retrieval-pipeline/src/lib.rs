#![allow(clippy::missing_docs_in_private_items)]

pub mod filters;
pub mod fts;
pub mod pipeline;
mod rows;
pub mod scoring;
pub mod vector;

pub use filters::SearchFilters;
pub use pipeline::{SearchEngine, SearchMode, SearchPage, SearchRequest, SearchSort, SearchTuning};
pub use scoring::{reciprocal_rank_fusion, FusedCandidate};
