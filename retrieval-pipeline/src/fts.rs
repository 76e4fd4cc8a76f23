use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::article::Article},
};
use tracing::debug;

use crate::{
    filters::SearchFilters,
    pipeline::SearchSort,
    rows::{candidate_ids, total_of, CandidateRow, CountRow, OMIT_VECTOR},
};

const MATCH_PREDICATE: &str = "search_document @0@ $terms";

fn order_clause(sort: SearchSort) -> &'static str {
    match sort {
        SearchSort::Relevance => "fts_score DESC, published_at DESC",
        SearchSort::Newest => "published_at DESC",
        SearchSort::Oldest => "published_at ASC",
    }
}

/// Ids of the best BM25 matches, most relevant first.
pub async fn keyword_candidates(
    db: &SurrealDbClient,
    terms: &str,
    filters: &SearchFilters,
    take: usize,
) -> Result<Vec<String>, AppError> {
    let where_clause = filters.where_clause(&[MATCH_PREDICATE]);
    let order = order_clause(SearchSort::Relevance);
    let sql = format!(
        "SELECT id, published_at, search::score(0) AS fts_score FROM article \
         WHERE {where_clause} \
         ORDER BY {order} \
         LIMIT $limit"
    );
    debug!(limit = take, %where_clause, "keyword candidate query");

    let query = db
        .query(sql)
        .bind(("terms", terms.to_owned()))
        .bind(("limit", i64::try_from(take).unwrap_or(i64::MAX)));
    let mut response = filters.bind(query).await?;
    let rows: Vec<CandidateRow> = response.take(0)?;
    Ok(candidate_ids(rows))
}

/// One page of keyword matches in the requested order, plus the total match count.
pub async fn keyword_page(
    db: &SurrealDbClient,
    terms: &str,
    filters: &SearchFilters,
    sort: SearchSort,
    limit: usize,
    start: usize,
) -> Result<(Vec<Article>, u64), AppError> {
    let where_clause = filters.where_clause(&[MATCH_PREDICATE]);
    let order = order_clause(sort);
    let sql = format!(
        "SELECT *, search::score(0) AS fts_score {OMIT_VECTOR} FROM article \
         WHERE {where_clause} \
         ORDER BY {order} \
         LIMIT $limit START $start; \
         SELECT count() AS total FROM article WHERE {where_clause} GROUP ALL;"
    );
    debug!(limit, start, %where_clause, order, "keyword page query");

    let query = db
        .query(sql)
        .bind(("terms", terms.to_owned()))
        .bind(("limit", i64::try_from(limit).unwrap_or(i64::MAX)))
        .bind(("start", i64::try_from(start).unwrap_or(i64::MAX)));
    let mut response = filters.bind(query).await?;
    let articles: Vec<Article> = response.take(0)?;
    let total: Option<CountRow> = response.take(1)?;
    Ok((articles, total_of(total)))
}
