use std::collections::HashMap;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{article::Article, surreal_serde::deserialize_flexible_id, StoredObject},
    },
};
use serde::Deserialize;
use surrealdb::sql::Thing;

/// Appended to every row projection; vectors never leave the database.
pub const OMIT_VECTOR: &str = "OMIT embedding";

#[derive(Debug, Deserialize)]
pub struct CandidateRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CountRow {
    pub total: u64,
}

pub fn candidate_ids(rows: Vec<CandidateRow>) -> Vec<String> {
    rows.into_iter().map(|row| row.id).collect()
}

pub fn total_of(row: Option<CountRow>) -> u64 {
    row.map_or(0, |row| row.total)
}

/// Loads the given articles and returns them in the order of `ids`. Ids without a row are
/// dropped.
pub async fn fetch_in_order(db: &SurrealDbClient, ids: &[String]) -> Result<Vec<Article>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let things: Vec<Thing> = ids
        .iter()
        .map(|id| Thing::from((Article::table_name(), id.as_str())))
        .collect();

    let mut response = db
        .query(format!(
            "SELECT * {OMIT_VECTOR} FROM type::table($table) WHERE id IN $things"
        ))
        .bind(("table", Article::table_name()))
        .bind(("things", things))
        .await?;
    let rows: Vec<Article> = response.take(0)?;

    let mut by_id: HashMap<String, Article> = rows
        .into_iter()
        .map(|article| (article.id.clone(), article))
        .collect();

    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}
