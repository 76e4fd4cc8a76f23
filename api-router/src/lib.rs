#![allow(clippy::missing_docs_in_private_items)]

use api_state::ApiState;
use axum::{
    extract::FromRef,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    articles::{
        backfill_article_embeddings, reembed_article, requeue_pending_articles,
        rescrape_article, resummarize_article, retranslate_article, sync_articles,
    },
    health::health,
    liveness::live,
    readiness::ready,
    search::search_articles,
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route("/health", get(health))
        .route("/articles/search", get(search_articles));

    // Operator endpoints (require the admin key)
    let admin = Router::new()
        .route("/articles/sync", post(sync_articles))
        .route("/articles/requeue-pending", post(requeue_pending_articles))
        .route("/articles/backfill-embeddings", post(backfill_article_embeddings))
        .route("/articles/{id}/scrape", post(rescrape_article))
        .route("/articles/{id}/translate", post(retranslate_article))
        .route("/articles/{id}/summarize", post(resummarize_article))
        .route("/articles/{id}/embed", post(reembed_article))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(admin)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use common::{
        clients::{FeedEntry, FeedReader, Translator},
        error::AppError,
        queue::JobQueue,
        storage::{
            db::SurrealDbClient,
            types::article::{build_search_document, Article, NewArticle},
            types::feed::Feed,
        },
        utils::config::AppConfig,
    };
    use ingestion_pipeline::{
        ContentPipeline, FeedSync, ImagePersister, PipelineConfig, PipelineServices,
    };
    use retrieval_pipeline::SearchEngine;
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::api_state::ServiceProbe;

    struct EmptyReader;

    #[async_trait]
    impl FeedReader for EmptyReader {
        async fn list_unread_entries(&self, _limit: usize) -> Result<Vec<FeedEntry>, AppError> {
            Ok(Vec::new())
        }

        async fn mark_read(&self, _entry_id: i64) -> Result<(), AppError> {
            Ok(())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    struct NoImages;

    #[async_trait]
    impl ImagePersister for NoImages {
        async fn persist(&self, _article_id: &str, _image_url: &str) -> Option<String> {
            None
        }
    }

    /// Every external call fails; router tests never reach them except where noted.
    struct OfflineServices;

    #[async_trait]
    impl PipelineServices for OfflineServices {
        async fn fetch_page(&self, _url: &str, _accept_language: &str) -> Result<String, AppError> {
            Err(AppError::Upstream("offline".into()))
        }

        async fn persist_image(&self, _article_id: &str, _image_url: &str) -> Option<String> {
            None
        }

        fn translators(&self) -> &[Arc<dyn Translator>] {
            &[]
        }

        async fn complete_chat(
            &self,
            _system: &str,
            _user: &str,
            _temperature: f32,
        ) -> Result<String, AppError> {
            Err(AppError::Upstream("offline".into()))
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AppError> {
            Err(AppError::Upstream("offline".into()))
        }
    }

    struct StaticProbe(&'static str, bool);

    #[async_trait]
    impl ServiceProbe for StaticProbe {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn healthy(&self) -> bool {
            self.1
        }
    }

    const ADMIN_KEY: &str = "operator-secret";

    async fn test_state(admin_api_key: Option<&str>) -> ApiState {
        let db = SurrealDbClient::memory("api_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");
        db.ensure_initialized().await.expect("schema");
        let db = Arc::new(db);
        let queue = JobQueue::connect(Arc::clone(&db)).await.expect("queue");

        let config = AppConfig {
            admin_api_key: admin_api_key.map(str::to_string),
            ..AppConfig::default()
        };
        let pipeline = Arc::new(ContentPipeline::new(
            Arc::clone(&db),
            PipelineConfig::default(),
            Arc::new(OfflineServices),
        ));
        let sync = Arc::new(FeedSync::new(
            Arc::clone(&queue),
            Arc::new(EmptyReader),
            Arc::new(NoImages),
            50,
        ));
        let search = Arc::new(SearchEngine::new(Arc::clone(&db), None));

        ApiState::new(&config, queue, pipeline, sync, search)
    }

    async fn store_article(db: &SurrealDbClient) -> Article {
        let feed = Feed::new(
            7,
            "NHK".into(),
            "https://example.jp/rss".into(),
            "jp".into(),
            "jp-news".into(),
            "ja".into(),
            "NHK".into(),
        );
        let mut article = Article::new(
            NewArticle {
                external_entry_id: 70,
                title: "Diet passes budget".into(),
                content: "The budget passed after debate.".into(),
                url: "https://example.jp/budget".into(),
                published_at: Utc::now(),
                image_url: None,
            },
            &feed,
        );
        article.search_document = build_search_document(
            Some("Diet passes budget"),
            Some("The budget passed after debate."),
            None,
        );
        db.store_item(article.clone()).await.expect("store article");
        article
    }

    fn app(state: &ApiState) -> Router {
        Router::new()
            .nest("/api/v1", api_routes_v1(state))
            .with_state(state.clone())
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn admin_post(uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        builder.body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn probes_answer() {
        let state = test_state(None).await;

        let (status, _) = call(app(&state), get_request("/api/v1/live")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(app(&state), get_request("/api/v1/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["db"], "ok");
    }

    #[tokio::test]
    async fn health_reports_degraded_services() {
        let state = test_state(None)
            .await
            .with_probe(Arc::new(StaticProbe("miniflux", true)))
            .with_probe(Arc::new(StaticProbe("libretranslate", false)));

        let (status, body) = call(app(&state), get_request("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["services"]["miniflux"], true);
        assert_eq!(body["services"]["libretranslate"], false);
    }

    #[tokio::test]
    async fn search_requires_query() {
        let state = test_state(None).await;
        let (status, body) = call(app(&state), get_request("/api/v1/articles/search")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn search_returns_a_page() {
        let state = test_state(None).await;
        let article = store_article(&state.db).await;

        let (status, body) = call(
            app(&state),
            get_request("/api/v1/articles/search?q=budget&region=jp"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["page"], 1);
        assert_eq!(body["pageSize"], 20);
        assert_eq!(body["data"][0]["id"], article.id.as_str());
        assert!(body["data"][0].get("embedding").is_none());
    }

    #[tokio::test]
    async fn search_rejects_bad_dates() {
        let state = test_state(None).await;
        let (status, _) = call(
            app(&state),
            get_request("/api/v1/articles/search?q=budget&dateFrom=yesterday"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_routes_are_closed_without_a_configured_key() {
        let state = test_state(None).await;
        let (status, _) = call(
            app(&state),
            admin_post("/api/v1/articles/sync", Some("anything")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_routes_check_the_key() {
        let state = test_state(Some(ADMIN_KEY)).await;

        let (status, _) = call(app(&state), admin_post("/api/v1/articles/sync", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            app(&state),
            admin_post("/api/v1/articles/sync", Some("wrong")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            app(&state),
            admin_post("/api/v1/articles/sync", Some(ADMIN_KEY)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
        assert_eq!(body["created"], 0);
    }

    #[tokio::test]
    async fn bearer_token_is_accepted() {
        let state = test_state(Some(ADMIN_KEY)).await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/articles/sync")
            .header("Authorization", format!("Bearer {ADMIN_KEY}"))
            .body(Body::empty())
            .expect("request");
        let (status, _) = call(app(&state), request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn requeue_routes_enqueue_on_the_article_region() {
        let state = test_state(Some(ADMIN_KEY)).await;
        let article = store_article(&state.db).await;

        let (status, body) = call(
            app(&state),
            admin_post(
                &format!("/api/v1/articles/{}/summarize", article.id),
                Some(ADMIN_KEY),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "queued");
        assert_eq!(body["queue"], "summarize-jp");
        assert!(body["jobId"].is_string());

        let (status, body) = call(
            app(&state),
            admin_post(
                &format!("/api/v1/articles/{}/translate", article.id),
                Some(ADMIN_KEY),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queue"], "translate-jp");
    }

    #[tokio::test]
    async fn requeue_of_unknown_article_is_not_found() {
        let state = test_state(Some(ADMIN_KEY)).await;
        let (status, body) = call(
            app(&state),
            admin_post("/api/v1/articles/missing/embed", Some(ADMIN_KEY)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn forced_translation_rejects_unknown_providers() {
        let state = test_state(Some(ADMIN_KEY)).await;
        let article = store_article(&state.db).await;
        let (status, _) = call(
            app(&state),
            admin_post(
                &format!("/api/v1/articles/{}/translate?provider=babelfish", article.id),
                Some(ADMIN_KEY),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn maintenance_routes_report_their_work() {
        let state = test_state(Some(ADMIN_KEY)).await;
        store_article(&state.db).await;

        let (status, _) = call(
            app(&state),
            admin_post("/api/v1/articles/requeue-pending", None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(
            app(&state),
            admin_post("/api/v1/articles/requeue-pending?region=tw", Some(ADMIN_KEY)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enqueued"], 0);

        let (status, body) = call(
            app(&state),
            admin_post("/api/v1/articles/requeue-pending?region=jp", Some(ADMIN_KEY)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enqueued"], 1);
        assert_eq!(body["byRegion"]["jp"], 1);
        assert_eq!(state.queue.queue_depth("scrape-jp").await.expect("depth"), 1);

        let (status, body) = call(
            app(&state),
            admin_post(
                "/api/v1/articles/backfill-embeddings?batchSize=10",
                Some(ADMIN_KEY),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
        assert_eq!(body["embedded"], 0);
    }
}
