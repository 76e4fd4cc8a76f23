use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Feed, "feed", {
    external_feed_id: i64,
    name: String,
    url: String,
    region_id: String,
    category_id: String,
    source_language: String,
    source_name: String,
    enabled: bool
});

impl Feed {
    pub fn new(
        external_feed_id: i64,
        name: String,
        url: String,
        region_id: String,
        category_id: String,
        source_language: String,
        source_name: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            external_feed_id,
            name,
            url,
            region_id,
            category_id,
            source_language,
            source_name,
            enabled: true,
        }
    }

    /// Looks up the feed registered for an upstream feed-reader id.
    pub async fn get_by_external_id(
        external_feed_id: i64,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM type::table($table) WHERE external_feed_id = $external_id LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("external_id", external_feed_id))
            .await?;

        let feed: Option<Self> = response.take(0)?;
        Ok(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_feed_by_external_id() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");

        let feed = Feed::new(
            42,
            "NHK".into(),
            "https://www3.nhk.or.jp/rss/news/cat0.xml".into(),
            "jp".into(),
            "jp-politics".into(),
            "ja".into(),
            "NHK News".into(),
        );
        db.store_item(feed.clone()).await.expect("store feed");

        let found = Feed::get_by_external_id(42, &db).await.expect("query");
        assert_eq!(found.map(|f| f.id), Some(feed.id));

        let missing = Feed::get_by_external_id(7, &db).await.expect("query");
        assert!(missing.is_none());
    }
}
