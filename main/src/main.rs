use common::utils::config::get_config;
use ingestion_pipeline::{register_workers, start_schedules};
use tracing::{error, info};

mod wiring;

use wiring::{build_app, init_tracing, shutdown_signal, AppServices};

/// Server and workers in one process, sharing one database connection.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = get_config()?;
    let services = AppServices::from_config(config).await?;

    register_workers(
        &services.queue,
        services.pipeline.clone(),
        services.sync.clone(),
        &services.config,
    )
    .await?;
    start_schedules(&services.queue, &services.config).await?;
    info!(regions = ?services.config.regions, "Workers started");

    let app = build_app(&services.api_state());

    info!("Starting server listening on 0.0.0.0:{}", services.config.http_port);
    let serve_address = format!("0.0.0.0:{}", services.config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    // In-flight jobs finish before the process exits.
    services.queue.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use common::{
        storage::db::SurrealDbClient,
        utils::{
            config::{AppConfig, StorageKind},
            embedding::EmbeddingBackend,
        },
    };
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn smoke_test_config(namespace: &str, database: &str) -> AppConfig {
        AppConfig {
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: namespace.into(),
            surrealdb_database: database.into(),
            openai_api_key: "test-key".into(),
            openai_base_url: "https://example.com".into(),
            http_port: 0,
            storage: StorageKind::Memory,
            embedding_backend: EmbeddingBackend::Hashed,
            embedding_dimensions: 64,
            admin_api_key: Some("smoke".into()),
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_with_in_memory_surrealdb() {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let config = smoke_test_config(namespace, &database);
        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );

        let services = AppServices::with_db(config, db)
            .await
            .expect("failed to wire services");
        let app = build_app(&services.api_state());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let ready_response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("ready response");
        assert_eq!(ready_response.status(), StatusCode::OK);

        let search_response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/articles/search?q=typhoon&mode=hybrid")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("search response");
        assert_eq!(search_response.status(), StatusCode::OK);

        services.queue.close().await.expect("close queue");
    }
}
