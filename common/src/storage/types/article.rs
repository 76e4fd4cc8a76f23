use serde::Serialize;
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{
    error::AppError,
    queue::names::Stage,
    storage::db::SurrealDbClient,
    stored_object,
};

use super::{
    feed::Feed,
    stage_status::{
        EmbeddingStatus, StageEvent, SummaryCategory, SummaryStatus, TranslationProvider,
        TranslationStatus,
    },
};

stored_object!(Article, "article", {
    external_entry_id: i64,
    feed_id: String,
    region_id: String,
    category_id: String,
    source_name: String,
    original_title: String,
    original_content: String,
    original_url: String,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime")]
    published_at: DateTime<Utc>,
    source_language: String,
    #[serde(default)]
    image_url: Option<String>,

    #[serde(default)]
    translated_title: Option<String>,
    #[serde(default)]
    translated_content: Option<String>,
    #[serde(default)]
    translation_status: TranslationStatus,
    #[serde(default)]
    translation_provider: Option<TranslationProvider>,
    #[serde(default)]
    translation_error: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    translated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    summary_tldr: Option<String>,
    #[serde(default)]
    summary_bullets: Vec<String>,
    #[serde(default)]
    summary_tags: Vec<String>,
    #[serde(default)]
    summary_sentiment: Option<String>,
    #[serde(default)]
    summary_category: Option<SummaryCategory>,
    #[serde(default)]
    summary_status: SummaryStatus,
    #[serde(default)]
    summary_error: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    summarized_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    embedding_status: EmbeddingStatus,
    #[serde(default)]
    embedding_error: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    embedded_at: Option<DateTime<Utc>>,

    #[serde(default)]
    search_document: String
});

/// Validated output of the summarize stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleSummary {
    pub tldr: String,
    pub bullets: Vec<String>,
    pub tags: Vec<String>,
    pub sentiment: String,
    pub category: SummaryCategory,
}

/// Upstream entry data needed to create an article.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub external_entry_id: i64,
    pub title: String,
    pub content: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub image_url: Option<String>,
}

/// Text the full-text index is built over.
pub fn build_search_document(
    translated_title: Option<&str>,
    translated_content: Option<&str>,
    summary_tldr: Option<&str>,
) -> String {
    [translated_title, translated_content, summary_tldr]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

impl Article {
    pub fn new(entry: NewArticle, feed: &Feed) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            external_entry_id: entry.external_entry_id,
            feed_id: feed.id.clone(),
            region_id: feed.region_id.clone(),
            category_id: feed.category_id.clone(),
            source_name: feed.source_name.clone(),
            original_title: entry.title,
            original_content: entry.content,
            original_url: entry.url,
            published_at: entry.published_at,
            source_language: feed.source_language.clone(),
            image_url: entry.image_url,
            translated_title: None,
            translated_content: None,
            translation_status: TranslationStatus::Pending,
            translation_provider: None,
            translation_error: None,
            translated_at: None,
            summary_tldr: None,
            summary_bullets: Vec::new(),
            summary_tags: Vec::new(),
            summary_sentiment: None,
            summary_category: None,
            summary_status: SummaryStatus::Pending,
            summary_error: None,
            summarized_at: None,
            embedding: None,
            embedding_status: EmbeddingStatus::Pending,
            embedding_error: None,
            embedded_at: None,
            search_document: String::new(),
        }
    }

    pub async fn get_by_external_entry_id(
        external_entry_id: i64,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * OMIT embedding FROM type::table($table) \
                 WHERE external_entry_id = $external_id LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("external_id", external_entry_id))
            .await?;

        let article: Option<Self> = response.take(0)?;
        Ok(article)
    }

    /// Articles whose translation never started, oldest first, optionally for one region.
    pub async fn list_translation_pending(
        region_id: Option<&str>,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let region_clause = if region_id.is_some() {
            " AND region_id = $region"
        } else {
            ""
        };
        let sql = format!(
            "SELECT * OMIT embedding FROM type::table($table) \
             WHERE translation_status = $pending{region_clause} ORDER BY created_at ASC"
        );
        let mut query = db
            .query(sql)
            .bind(("table", Self::table_name()))
            .bind(("pending", TranslationStatus::Pending.as_str()));
        if let Some(region) = region_id {
            query = query.bind(("region", region.to_string()));
        }

        let articles: Vec<Self> = query.await?.take(0)?;
        Ok(articles)
    }

    /// Summarized articles that have no embedding yet, oldest first.
    pub async fn list_missing_embeddings(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE summary_status = $complete AND (embedding = NONE OR embedding = NULL) \
                 ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("complete", SummaryStatus::Complete.as_str()))
            .await?;

        let articles: Vec<Self> = response.take(0)?;
        Ok(articles)
    }

    /// Text used for the embedding: title plus the most condensed body available.
    pub fn embedding_source(&self) -> String {
        let title = self
            .translated_title
            .as_deref()
            .unwrap_or(&self.original_title);
        let body = self
            .summary_tldr
            .as_deref()
            .or(self.translated_content.as_deref())
            .unwrap_or(&self.original_content);
        format!("{title}\n\n{body}")
    }

    async fn update_returning(
        &self,
        db: &SurrealDbClient,
        set_clause: &str,
        bind: impl FnOnce(
            surrealdb::method::Query<'_, surrealdb::engine::any::Any>,
        ) -> surrealdb::method::Query<'_, surrealdb::engine::any::Any>,
    ) -> Result<Self, AppError> {
        let sql = format!(
            "UPDATE type::thing($table, $id) SET {set_clause}, updated_at = $now RETURN AFTER;"
        );
        let query = db
            .query(sql)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("now", SurrealDatetime::from(Utc::now())));

        let mut response = bind(query).await?;
        let updated: Option<Self> = response.take(0)?;
        updated.ok_or_else(|| AppError::NotFound(format!("article {} no longer exists", self.id)))
    }

    pub async fn replace_original_content(
        &self,
        content: String,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        self.update_returning(db, "original_content = $content", |q| {
            q.bind(("content", content))
        })
        .await
    }

    pub async fn set_image_url(&self, url: String, db: &SurrealDbClient) -> Result<Self, AppError> {
        self.update_returning(db, "image_url = $image_url", |q| {
            q.bind(("image_url", url))
        })
        .await
    }

    pub async fn begin_translation(&self, db: &SurrealDbClient) -> Result<Self, AppError> {
        let next = self.translation_status.apply(StageEvent::Start)?;
        self.update_returning(db, "translation_status = $status", |q| {
            q.bind(("status", next.as_str()))
        })
        .await
    }

    pub async fn complete_translation(
        &self,
        title: String,
        content: String,
        provider: TranslationProvider,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let next = self.translation_status.apply(StageEvent::Succeed)?;
        let document =
            build_search_document(Some(&title), Some(&content), self.summary_tldr.as_deref());

        self.update_returning(
            db,
            "translated_title = $title, translated_content = $content, \
             translation_provider = $provider, translation_status = $status, \
             translation_error = NONE, translated_at = $now, search_document = $document",
            |q| {
                q.bind(("title", title))
                    .bind(("content", content))
                    .bind(("provider", provider.as_str()))
                    .bind(("status", next.as_str()))
                    .bind(("document", document))
            },
        )
        .await
    }

    pub async fn record_translation_error(
        &self,
        message: String,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let next = self.translation_status.apply(StageEvent::Fail)?;
        self.update_returning(
            db,
            "translation_status = $status, translation_error = $error",
            |q| q.bind(("status", next.as_str())).bind(("error", message)),
        )
        .await
    }

    pub async fn begin_summary(&self, db: &SurrealDbClient) -> Result<Self, AppError> {
        let next = self.summary_status.apply(StageEvent::Start)?;
        self.update_returning(db, "summary_status = $status", |q| {
            q.bind(("status", next.as_str()))
        })
        .await
    }

    pub async fn complete_summary(
        &self,
        summary: ArticleSummary,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let next = self.summary_status.apply(StageEvent::Succeed)?;
        let document = build_search_document(
            self.translated_title.as_deref(),
            self.translated_content.as_deref(),
            Some(&summary.tldr),
        );

        self.update_returning(
            db,
            "summary_tldr = $tldr, summary_bullets = $bullets, summary_tags = $tags, \
             summary_sentiment = $sentiment, summary_category = $category, \
             summary_status = $status, summary_error = NONE, summarized_at = $now, \
             search_document = $document",
            |q| {
                q.bind(("tldr", summary.tldr))
                    .bind(("bullets", summary.bullets))
                    .bind(("tags", summary.tags))
                    .bind(("sentiment", summary.sentiment))
                    .bind(("category", summary.category.as_str()))
                    .bind(("status", next.as_str()))
                    .bind(("document", document))
            },
        )
        .await
    }

    pub async fn record_summary_error(
        &self,
        message: String,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let next = self.summary_status.apply(StageEvent::Fail)?;
        self.update_returning(
            db,
            "summary_status = $status, summary_error = $error",
            |q| q.bind(("status", next.as_str())).bind(("error", message)),
        )
        .await
    }

    pub async fn begin_embedding(&self, db: &SurrealDbClient) -> Result<Self, AppError> {
        let next = self.embedding_status.apply(StageEvent::Start)?;
        self.update_returning(db, "embedding_status = $status", |q| {
            q.bind(("status", next.as_str()))
        })
        .await
    }

    pub async fn complete_embedding(
        &self,
        vector: Vec<f32>,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let next = self.embedding_status.apply(StageEvent::Succeed)?;
        self.update_returning(
            db,
            "embedding = $embedding, embedding_status = $status, embedding_error = NONE, \
             embedded_at = $now",
            |q| {
                q.bind(("embedding", vector))
                    .bind(("status", next.as_str()))
            },
        )
        .await
    }

    pub async fn record_embedding_error(
        &self,
        message: String,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let next = self.embedding_status.apply(StageEvent::Fail)?;
        self.update_returning(
            db,
            "embedding_status = $status, embedding_error = $error",
            |q| q.bind(("status", next.as_str())).bind(("error", message)),
        )
        .await
    }

    /// Puts the stage (and, for a full re-scrape, the stages it feeds) back to pending.
    ///
    /// Output fields are left untouched; the next successful run overwrites them.
    pub async fn reset_stage(&self, stage: Stage, db: &SurrealDbClient) -> Result<Self, AppError> {
        let pending = TranslationStatus::Pending.as_str();
        let clause = match stage {
            Stage::Scrape => {
                "translation_status = $pending, translation_error = NONE, \
                 summary_status = $pending, summary_error = NONE"
            }
            Stage::Translate => "translation_status = $pending, translation_error = NONE",
            Stage::Summarize => "summary_status = $pending, summary_error = NONE",
            Stage::Embed => "embedding_status = $pending, embedding_error = NONE",
        };
        self.update_returning(db, clause, |q| q.bind(("pending", pending)))
            .await
    }
}
