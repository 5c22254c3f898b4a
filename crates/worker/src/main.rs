use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilefarm_worker::client::ApiClient;
use tilefarm_worker::config::WorkerConfig;
use tilefarm_worker::render::GradientRenderer;
use tilefarm_worker::runner::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tilefarm_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(api_url = %config.api_url, task_id = config.task_id, "Loaded worker configuration");

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT (Ctrl-C), stopping worker");
        }
        cancel_on_signal.cancel();
    });

    let worker = Worker::new(
        ApiClient::new(config.api_url.clone()),
        Arc::new(GradientRenderer),
        config,
    );
    let completed = worker.run(cancel).await;

    tracing::info!(completed, "Worker stopped");
    Ok(())
}
