use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod error;
mod middleware;
mod routes;
mod state;

use agenda::{EventService, LiveRefreshController, PgEventStore, SystemClock};
use common::{
    cache::RedisPool,
    database,
    settings::Settings,
    token::{TokenVerifier, read_key_material},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    net::TcpListener,
    sync::watch,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
};

use crate::state::AppState;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting API service");

    let settings = Settings::load()?;

    // Initialize database connection pool
    let pool = database::init_pool(&settings.database).await?;

    // Check database connectivity
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }
    database::run_migrations(&pool).await?;

    let redis_pool = RedisPool::new(&settings.redis).await?;
    let verifier = TokenVerifier::new(&read_key_material(&settings.jwt.public_key)?)?;

    // Change feed and live board
    let store = Arc::new(PgEventStore::new(pool));
    let listener_task = store.start_listener().await?;
    let clock = Arc::new(SystemClock);
    let controller = LiveRefreshController::new(store.clone(), clock.clone());
    let refresh_handle = controller.spawn();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app_state = AppState {
        store: store.clone(),
        event_service: EventService::new(store),
        controller,
        verifier,
        redis_pool,
        clock,
        ready_timeout: Duration::from_millis(settings.board.ready_timeout_ms),
        shutdown: shutdown_rx,
    };

    info!("API service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&settings.server.api_addr).await?;
    info!("API service listening on {}", settings.server.api_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Ends the open event streams.
            let _ = shutdown_tx.send(true);
        })
        .await?;

    refresh_handle.shutdown().await;
    listener_task.abort();
    info!("API service stopped");

    Ok(())
}
