use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod error;
mod jwt;
mod middleware;
mod models;
mod repositories;
mod routes;
mod session;
mod validation;

use agenda::{EventService, PgEventStore};
use common::{
    cache::{RedisPool, RedisConfig},
    database,
    settings::Settings,
};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::{
    jwt::{JwtConfig, JwtService},
    repositories::UserRepository,
    session::SessionManager,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub redis_pool: RedisPool,
    pub jwt_service: JwtService,
    pub user_repository: UserRepository,
    pub session_manager: SessionManager,
    pub event_service: EventService,
}

async fn connect_redis(config: &RedisConfig) -> Result<RedisPool> {
    let redis_pool = RedisPool::new(config).await?;
    if redis_pool.health_check().await? {
        info!("Redis connection successful");
    } else {
        anyhow::bail!("Failed to connect to Redis");
    }
    Ok(redis_pool)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting authentication service");

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

    // Initialize JWT service
    let jwt_config = JwtConfig::from_settings(&settings.jwt)?;
    let jwt_service = JwtService::new(jwt_config)?;

    // Initialize Redis connection pool
    let redis_pool = connect_redis(&settings.redis).await?;

    let session_manager =
        SessionManager::new(redis_pool.clone(), jwt_service.refresh_token_expiry());
    let event_service = EventService::new(Arc::new(PgEventStore::new(pool.clone())));

    let app_state = AppState {
        redis_pool,
        jwt_service,
        user_repository: UserRepository::new(pool),
        session_manager,
        event_service,
    };

    info!("Authentication service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&settings.server.auth_addr).await?;
    info!(
        "Authentication service listening on {}",
        settings.server.auth_addr
    );

    axum::serve(listener, app).await?;

    Ok(())
}
