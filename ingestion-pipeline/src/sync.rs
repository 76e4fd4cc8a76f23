use std::sync::Arc;

use chrono::Utc;
use common::{
    clients::{FeedEntry, FeedReader},
    error::AppError,
    queue::{names::Stage, JobQueue},
    storage::types::{
        article::{Article, NewArticle},
        feed::Feed,
        job::JobPayload,
    },
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::utils::images::ImagePersister;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: usize,
    /// Unknown or disabled feed, or an entry that already has an article.
    pub skipped: usize,
    /// Entries whose ingestion hit an error.
    pub failed: usize,
    pub total: usize,
}

enum EntryOutcome {
    Created,
    Skipped,
}

/// Pulls unread entries from the feed reader into articles and starts their pipeline.
pub struct FeedSync {
    queue: Arc<JobQueue>,
    reader: Arc<dyn FeedReader>,
    images: Arc<dyn ImagePersister>,
    batch_size: usize,
}

impl FeedSync {
    pub fn new(
        queue: Arc<JobQueue>,
        reader: Arc<dyn FeedReader>,
        images: Arc<dyn ImagePersister>,
        batch_size: usize,
    ) -> Self {
        Self {
            queue,
            reader,
            images,
            batch_size: batch_size.max(1),
        }
    }

    /// Only the batch fetch is fatal; errors on individual entries are logged and counted as
    /// `failed`.
    ///
    /// The scrape job is enqueued before the entry is marked read, so a failed enqueue leaves
    /// the entry unread for the next run. An article stored without its scrape job stays in
    /// `pending` and is picked up by [`crate::requeue::requeue_pending`].
    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<SyncReport, AppError> {
        let entries = self.reader.list_unread_entries(self.batch_size).await?;
        let mut report = SyncReport {
            total: entries.len(),
            ..SyncReport::default()
        };
        info!(total = report.total, "fetched unread entries");

        for entry in &entries {
            match self.ingest_entry(entry).await {
                Ok(EntryOutcome::Created) => report.created += 1,
                Ok(EntryOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    warn!(entry_id = entry.id, error = %err, "failed to ingest entry");
                    report.failed += 1;
                }
            }
        }

        info!(
            created = report.created,
            skipped = report.skipped,
            failed = report.failed,
            total = report.total,
            "sync finished"
        );
        Ok(report)
    }

    async fn ingest_entry(&self, entry: &FeedEntry) -> Result<EntryOutcome, AppError> {
        let db = self.queue.db().as_ref();

        let Some(feed) = Feed::get_by_external_id(entry.feed_id, db).await? else {
            debug!(entry_id = entry.id, feed_id = entry.feed_id, "entry belongs to unknown feed");
            return Ok(EntryOutcome::Skipped);
        };

        if !feed.enabled {
            debug!(entry_id = entry.id, feed_id = entry.feed_id, "feed is disabled");
            return Ok(EntryOutcome::Skipped);
        }

        if Article::get_by_external_entry_id(entry.id, db).await?.is_some() {
            return Ok(EntryOutcome::Skipped);
        }

        let article = Article::new(
            NewArticle {
                external_entry_id: entry.id,
                title: entry.title.clone(),
                content: entry.content.clone(),
                url: entry.url.clone(),
                published_at: entry.published_at_or(Utc::now()),
                image_url: None,
            },
            &feed,
        );

        if let Err(err) = db.store_item(article.clone()).await {
            // A concurrent sync may have inserted the same entry between the lookup and here.
            if Article::get_by_external_entry_id(entry.id, db).await?.is_some() {
                debug!(entry_id = entry.id, "entry inserted concurrently");
                return Ok(EntryOutcome::Skipped);
            }
            return Err(err.into());
        }

        if let Some(image_url) = entry.image_enclosure() {
            if let Some(stored) = self.images.persist(&article.id, image_url).await {
                article.set_image_url(stored, db).await?;
            }
        }

        self.queue
            .send(
                &Stage::Scrape.queue(&feed.region_id),
                JobPayload::article(article.id.clone()),
            )
            .await?;

        if let Err(err) = self.reader.mark_read(entry.id).await {
            warn!(entry_id = entry.id, error = %err, "failed to mark entry read");
        }

        debug!(entry_id = entry.id, article_id = %article.id, "article created");
        Ok(EntryOutcome::Created)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use common::{
        clients::miniflux::Enclosure,
        storage::{
            db::SurrealDbClient,
            types::{
                job::Job,
                stage_status::{SummaryStatus, TranslationStatus},
            },
        },
    };
    use uuid::Uuid;

    use super::*;

    struct FakeReader {
        entries: Vec<FeedEntry>,
        marked: Mutex<Vec<i64>>,
        fail_mark_read: bool,
    }

    impl FakeReader {
        fn new(entries: Vec<FeedEntry>) -> Self {
            Self {
                entries,
                marked: Mutex::new(Vec::new()),
                fail_mark_read: false,
            }
        }
    }

    #[async_trait]
    impl FeedReader for FakeReader {
        async fn list_unread_entries(&self, limit: usize) -> Result<Vec<FeedEntry>, AppError> {
            Ok(self.entries.iter().take(limit).cloned().collect())
        }

        async fn mark_read(&self, entry_id: i64) -> Result<(), AppError> {
            if self.fail_mark_read {
                return Err(AppError::Upstream("miniflux down".into()));
            }
            self.marked.lock().expect("lock").push(entry_id);
            Ok(())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    struct BrokenReader;

    #[async_trait]
    impl FeedReader for BrokenReader {
        async fn list_unread_entries(&self, _limit: usize) -> Result<Vec<FeedEntry>, AppError> {
            Err(AppError::Upstream("Miniflux fetchEntries failed: 502".into()))
        }

        async fn mark_read(&self, _entry_id: i64) -> Result<(), AppError> {
            Ok(())
        }

        async fn health_check(&self) -> bool {
            false
        }
    }

    struct FixedImage;

    #[async_trait]
    impl ImagePersister for FixedImage {
        async fn persist(&self, article_id: &str, _image_url: &str) -> Option<String> {
            Some(format!("https://media.example.com/articles/{article_id}.jpg"))
        }
    }

    fn entry(id: i64, feed_id: i64) -> FeedEntry {
        FeedEntry {
            id,
            feed_id,
            title: format!("記事 {id}"),
            url: format!("https://example.jp/{id}"),
            content: "<p>本文</p>".into(),
            published_at: Some("2024-05-01T08:00:00Z".into()),
            enclosures: None,
        }
    }

    async fn setup() -> Arc<JobQueue> {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        let queue = JobQueue::connect(Arc::new(db)).await.expect("queue");
        let feed = Feed::new(
            7,
            "NHK".into(),
            "https://www3.nhk.or.jp/rss/news/cat0.xml".into(),
            "jp".into(),
            "jp-politics".into(),
            "ja".into(),
            "NHK".into(),
        );
        queue.db().store_item(feed).await.expect("feed");
        queue
    }

    #[tokio::test]
    async fn creates_articles_and_enqueues_scrape() {
        let queue = setup().await;
        let mut with_image = entry(2, 7);
        with_image.enclosures = Some(vec![Enclosure {
            url: "https://example.jp/2.jpg".into(),
            mime_type: "image/jpeg".into(),
        }]);
        let reader = Arc::new(FakeReader::new(vec![entry(1, 7), with_image]));
        let sync = FeedSync::new(Arc::clone(&queue), reader.clone(), Arc::new(FixedImage), 100);

        let report = sync.run().await.expect("sync");
        assert_eq!(
            report,
            SyncReport {
                created: 2,
                skipped: 0,
                failed: 0,
                total: 2
            }
        );
        assert_eq!(*reader.marked.lock().expect("lock"), vec![1, 2]);
        assert_eq!(queue.queue_depth("scrape-jp").await.expect("depth"), 2);

        let db = queue.db();
        let first = Article::get_by_external_entry_id(1, db)
            .await
            .expect("query")
            .expect("article");
        assert_eq!(first.translation_status, TranslationStatus::Pending);
        assert_eq!(first.summary_status, SummaryStatus::Pending);
        assert_eq!(first.region_id, "jp");
        assert!(first.image_url.is_none());

        let second = Article::get_by_external_entry_id(2, db)
            .await
            .expect("query")
            .expect("article");
        assert_eq!(
            second.image_url,
            Some(format!("https://media.example.com/articles/{}.jpg", second.id))
        );
    }

    #[tokio::test]
    async fn unknown_feeds_and_duplicates_are_skipped() {
        let queue = setup().await;
        let reader = Arc::new(FakeReader::new(vec![entry(1, 7), entry(3, 999)]));
        let sync = FeedSync::new(Arc::clone(&queue), reader, Arc::new(FixedImage), 100);

        let first = sync.run().await.expect("first sync");
        assert_eq!(first.created, 1);
        assert_eq!(first.skipped, 1);

        let second = sync.run().await.expect("second sync");
        assert_eq!(
            second,
            SyncReport {
                created: 0,
                skipped: 2,
                failed: 0,
                total: 2
            }
        );

        let articles = queue
            .db()
            .get_all_stored_items::<Article>()
            .await
            .expect("articles");
        assert_eq!(articles.len(), 1);
        let jobs = queue.db().get_all_stored_items::<Job>().await.expect("jobs");
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn disabled_feeds_are_skipped() {
        let queue = setup().await;
        let mut paused = Feed::new(
            8,
            "Paused".into(),
            "https://example.jp/paused.xml".into(),
            "jp".into(),
            "jp-local".into(),
            "ja".into(),
            "Paused".into(),
        );
        paused.enabled = false;
        queue.db().store_item(paused).await.expect("feed");

        let reader = Arc::new(FakeReader::new(vec![entry(5, 8)]));
        let sync = FeedSync::new(Arc::clone(&queue), reader.clone(), Arc::new(FixedImage), 100);

        let report = sync.run().await.expect("sync");
        assert_eq!(report.skipped, 1);
        assert!(reader.marked.lock().expect("lock").is_empty());
        assert_eq!(queue.queue_depth("scrape-jp").await.expect("depth"), 0);
    }

    #[tokio::test]
    async fn duplicate_entry_in_one_batch_is_created_once() {
        let queue = setup().await;
        let reader = Arc::new(FakeReader::new(vec![entry(4, 7), entry(4, 7)]));
        let sync = FeedSync::new(Arc::clone(&queue), reader.clone(), Arc::new(FixedImage), 100);

        let report = sync.run().await.expect("sync");
        assert_eq!(
            report,
            SyncReport {
                created: 1,
                skipped: 1,
                failed: 0,
                total: 2
            }
        );
        assert_eq!(*reader.marked.lock().expect("lock"), vec![4]);
        assert_eq!(queue.queue_depth("scrape-jp").await.expect("depth"), 1);

        let articles = queue
            .db()
            .get_all_stored_items::<Article>()
            .await
            .expect("articles");
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].external_entry_id, 4);
    }

    #[tokio::test]
    async fn entry_errors_are_counted_as_failed() {
        let queue = setup().await;
        // A feed row the model cannot load makes the lookup for entry 6 fail.
        queue
            .db()
            .query("CREATE feed SET external_feed_id = 9, name = 'Broken'")
            .await
            .expect("raw feed");

        let reader = Arc::new(FakeReader::new(vec![entry(6, 9), entry(1, 7)]));
        let sync = FeedSync::new(Arc::clone(&queue), reader.clone(), Arc::new(FixedImage), 100);

        let report = sync.run().await.expect("sync");
        assert_eq!(
            report,
            SyncReport {
                created: 1,
                skipped: 0,
                failed: 1,
                total: 2
            }
        );
        assert_eq!(*reader.marked.lock().expect("lock"), vec![1]);
    }

    #[tokio::test]
    async fn mark_read_failure_does_not_abort_ingestion() {
        let queue = setup().await;
        let mut reader = FakeReader::new(vec![entry(1, 7), entry(2, 7)]);
        reader.fail_mark_read = true;
        let sync = FeedSync::new(Arc::clone(&queue), Arc::new(reader), Arc::new(FixedImage), 100);

        let report = sync.run().await.expect("sync");
        assert_eq!(report.created, 2);
        assert_eq!(queue.queue_depth("scrape-jp").await.expect("depth"), 2);
    }

    #[tokio::test]
    async fn batch_fetch_failure_fails_the_run() {
        let queue = setup().await;
        let sync = FeedSync::new(queue, Arc::new(BrokenReader), Arc::new(FixedImage), 100);
        assert!(matches!(sync.run().await, Err(AppError::Upstream(_))));
    }
}
