use common::utils::config::get_config;
use ingestion_pipeline::{register_workers, start_schedules};
use tracing::info;

#[allow(dead_code)]
mod wiring;

use wiring::{init_tracing, shutdown_signal, AppServices};

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
    info!(regions = ?services.config.regions, "Starting worker process");

    shutdown_signal().await;
    services.queue.close().await?;
    Ok(())
}
