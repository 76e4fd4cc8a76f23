use common::utils::config::get_config;
use tracing::info;

mod wiring;

use wiring::{build_app, init_tracing, shutdown_signal, AppServices};

/// HTTP surface only. Operator requeues still go onto the shared queue tables.
#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = get_config()?;
    let services = AppServices::from_config(config).await?;
    let app = build_app(&services.api_state());

    info!("Starting server listening on 0.0.0.0:{}", services.config.http_port);
    let serve_address = format!("0.0.0.0:{}", services.config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.queue.close().await?;
    Ok(())
}
