//! Application state shared across handlers

use agenda::{Clock, EventService, EventStore, LiveRefreshController};
use common::{cache::RedisPool, token::TokenVerifier};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub event_service: EventService,
    pub controller: Arc<LiveRefreshController>,
    pub verifier: TokenVerifier,
    pub redis_pool: RedisPool,
    pub clock: Arc<dyn Clock>,
    /// How long a board request waits for the board to load
    pub ready_timeout: Duration,
    /// Flips to `true` when the server starts shutting down
    pub shutdown: watch::Receiver<bool>,
}
