use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{error::AppError, storage::db::SurrealDbClient};

pub const FTS_ANALYZER_NAME: &str = "article_en_fts_analyzer";

#[derive(Clone, Copy)]
enum IndexKind {
    Standard,
    Unique,
    /// BM25 full-text index using the shared analyzer.
    Search,
}

#[derive(Clone, Copy)]
struct IndexSpec {
    index_name: &'static str,
    table: &'static str,
    fields: &'static str,
    kind: IndexKind,
}

impl IndexSpec {
    fn definition(&self) -> String {
        let suffix = match self.kind {
            IndexKind::Standard => String::new(),
            IndexKind::Unique => " UNIQUE".to_string(),
            IndexKind::Search => format!(" SEARCH ANALYZER {FTS_ANALYZER_NAME} BM25"),
        };

        format!(
            "DEFINE INDEX IF NOT EXISTS {index} ON TABLE {table} FIELDS {fields}{suffix};",
            index = self.index_name,
            table = self.table,
            fields = self.fields,
        )
    }
}

const INDEX_SPECS: &[IndexSpec] = &[
    IndexSpec {
        index_name: "idx_feed_external_id",
        table: "feed",
        fields: "external_feed_id",
        kind: IndexKind::Unique,
    },
    IndexSpec {
        index_name: "idx_article_external_entry",
        table: "article",
        fields: "external_entry_id",
        kind: IndexKind::Unique,
    },
    IndexSpec {
        index_name: "idx_article_published",
        table: "article",
        fields: "published_at",
        kind: IndexKind::Standard,
    },
    IndexSpec {
        index_name: "idx_article_region",
        table: "article",
        fields: "region_id",
        kind: IndexKind::Standard,
    },
    IndexSpec {
        index_name: "idx_article_status",
        table: "article",
        fields: "translation_status, summary_status",
        kind: IndexKind::Standard,
    },
    IndexSpec {
        index_name: "idx_article_search",
        table: "article",
        fields: "search_document",
        kind: IndexKind::Search,
    },
    IndexSpec {
        index_name: "idx_job_queue_state",
        table: "job",
        fields: "queue, state",
        kind: IndexKind::Standard,
    },
    IndexSpec {
        index_name: "idx_job_scheduled",
        table: "job",
        fields: "scheduled_at",
        kind: IndexKind::Standard,
    },
];

/// Defines the analyzer and every index the pipeline and search rely on.
/// Idempotent: existing definitions are left untouched.
pub async fn ensure_indexes(db: &SurrealDbClient) -> Result<(), AppError> {
    ensure_indexes_inner(db)
        .await
        .map_err(|err| AppError::InternalError(err.to_string()))
}

async fn ensure_indexes_inner(db: &SurrealDbClient) -> Result<()> {
    create_fts_analyzer(db).await?;

    for spec in INDEX_SPECS {
        let definition = spec.definition();
        debug!(index = spec.index_name, table = spec.table, "defining index");
        db.client
            .query(definition)
            .await
            .with_context(|| format!("creating index {} on {}", spec.index_name, spec.table))?
            .check()
            .with_context(|| {
                format!(
                    "index definition failed for {} on {}",
                    spec.index_name, spec.table
                )
            })?;
    }

    info!(count = INDEX_SPECS.len(), "database indexes ensured");
    Ok(())
}

async fn create_fts_analyzer(db: &SurrealDbClient) -> Result<()> {
    let analyzer_query = format!(
        "DEFINE ANALYZER IF NOT EXISTS {FTS_ANALYZER_NAME}
            TOKENIZERS class
            FILTERS lowercase, ascii, snowball(english);"
    );

    let res = db
        .client
        .query(analyzer_query)
        .await
        .context("creating FTS analyzer")?;

    res.check().context("failed to create FTS analyzer")?;
    Ok(())
}
