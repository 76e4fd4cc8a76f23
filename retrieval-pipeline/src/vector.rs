use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::article::Article},
};
use tracing::debug;

use crate::{
    filters::SearchFilters,
    rows::{candidate_ids, total_of, CandidateRow, CountRow, OMIT_VECTOR},
};

/// Only vectors of the query's dimension are comparable.
const EMBEDDED_PREDICATES: &[&str] = &[
    "embedding != NONE",
    "array::len(embedding) = $dimension",
];

fn bind_vector<'a>(
    query: surrealdb::method::Query<'a, surrealdb::engine::any::Any>,
    embedding: &[f32],
) -> surrealdb::method::Query<'a, surrealdb::engine::any::Any> {
    query
        .bind(("embedding", embedding.to_vec()))
        .bind(("dimension", i64::try_from(embedding.len()).unwrap_or(i64::MAX)))
}

/// Ids of the nearest articles by cosine similarity, closest first.
pub async fn semantic_candidates(
    db: &SurrealDbClient,
    embedding: &[f32],
    filters: &SearchFilters,
    take: usize,
) -> Result<Vec<String>, AppError> {
    let where_clause = filters.where_clause(EMBEDDED_PREDICATES);
    let sql = format!(
        "SELECT id, vector::similarity::cosine(embedding, $embedding) AS similarity FROM article \
         WHERE {where_clause} \
         ORDER BY similarity DESC \
         LIMIT $limit"
    );
    debug!(limit = take, %where_clause, "semantic candidate query");

    let query = bind_vector(db.query(sql), embedding)
        .bind(("limit", i64::try_from(take).unwrap_or(i64::MAX)));
    let mut response = filters.bind(query).await?;
    let rows: Vec<CandidateRow> = response.take(0)?;
    Ok(candidate_ids(rows))
}

/// One page of articles ordered by similarity, plus the number of comparable articles.
pub async fn semantic_page(
    db: &SurrealDbClient,
    embedding: &[f32],
    filters: &SearchFilters,
    limit: usize,
    start: usize,
) -> Result<(Vec<Article>, u64), AppError> {
    let where_clause = filters.where_clause(EMBEDDED_PREDICATES);
    let sql = format!(
        "SELECT *, vector::similarity::cosine(embedding, $embedding) AS similarity {OMIT_VECTOR} \
         FROM article \
         WHERE {where_clause} \
         ORDER BY similarity DESC \
         LIMIT $limit START $start; \
         SELECT count() AS total FROM article WHERE {where_clause} GROUP ALL;"
    );
    debug!(limit, start, %where_clause, "semantic page query");

    let query = bind_vector(db.query(sql), embedding)
        .bind(("limit", i64::try_from(limit).unwrap_or(i64::MAX)))
        .bind(("start", i64::try_from(start).unwrap_or(i64::MAX)));
    let mut response = filters.bind(query).await?;
    let articles: Vec<Article> = response.take(0)?;
    let total: Option<CountRow> = response.take(1)?;
    Ok((articles, total_of(total)))
}
