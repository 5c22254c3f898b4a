use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tilefarm_db::{JobStore, MemoryJobStore, PgJobStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilefarm_api::config::ServerConfig;
use tilefarm_api::router::build_app_router;
use tilefarm_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tilefarm_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        tile_size = config.tile_size,
        strict_claim = config.strict_claim,
        stale_job_timeout_secs = ?config.stale_job_timeout_secs,
        "Loaded server configuration",
    );

    // --- Job store ---
    let store: Arc<dyn JobStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = tilefarm_db::create_pool(&database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            tilefarm_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database health check passed");

            tilefarm_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgJobStore::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using the in-memory job store");
            Arc::new(MemoryJobStore::new())
        }
    };

    // --- App state ---
    let state = AppState::new(store, config.clone());
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    tokio::select! {
        result = server.into_future() => result.expect("Server error"),
        () = drain_deadline(drain) => {
            tracing::warn!(timeout_secs = config.shutdown_timeout_secs, "Drain timeout reached, exiting");
        }
    }

    tracing::info!("Graceful shutdown complete");
}

/// Resolves `budget` after the first shutdown signal, bounding how long
/// in-flight requests may keep the process alive.
async fn drain_deadline(budget: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(budget).await;
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
