//! API service routes

use agenda::{
    BoardView, CalendarEntry, Clock, EventForm, Notification, NotificationFeed, ResponseKind,
    UserId, Viewer, board::Board,
};
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::{delete, get, post, put},
};
use futures_util::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{future::Future, sync::Arc};
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    middleware::{auth_middleware, optional_auth_middleware},
    state::AppState,
};

/// Request body of a response submission
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub response: ResponseKind,
}

/// Notification as sent on the notification stream
#[derive(Serialize)]
struct NotificationPayload<'a> {
    message: String,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/events", post(create_event))
        .route("/events/:id", delete(delete_event))
        .route("/events/:id/response", put(respond))
        .route("/notifications", get(notifications))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/events", get(get_board))
        .route("/events/live", get(live_board))
        .route("/events/calendar", get(get_calendar))
        .route("/events/:id", get(get_event))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let board = state.controller.board();
    Json(json!({
        "status": "ok",
        "service": "api-service",
        "board": {
            "phase": board.phase,
            "stale": board.stale,
            "events": board.events.len(),
        }
    }))
}

fn viewer_id(viewer: &Option<Extension<Viewer>>) -> Option<UserId> {
    viewer.as_ref().map(|Extension(viewer)| viewer.id)
}

async fn ready_board(state: &AppState) -> ApiResult<Arc<Board>> {
    state
        .controller
        .wait_ready(state.ready_timeout)
        .await
        .ok_or_else(|| ApiError::Unavailable("The event board is still loading".to_string()))
}

/// Categorized upcoming events
pub async fn get_board(
    State(state): State<AppState>,
    viewer: Option<Extension<Viewer>>,
) -> ApiResult<Json<BoardView>> {
    let board = ready_board(&state).await?;

    board
        .view(viewer_id(&viewer), state.clock.now())
        .map(Json)
        .ok_or(ApiError::InternalServerError)
}

/// Upcoming events as calendar entries
pub async fn get_calendar(State(state): State<AppState>) -> ApiResult<Json<Vec<CalendarEntry>>> {
    let board = ready_board(&state).await?;

    board
        .calendar()
        .map(Json)
        .ok_or(ApiError::InternalServerError)
}

/// Completes once the server is shutting down
fn shutdown_started(state: &AppState) -> impl Future<Output = ()> + Send + 'static + use<> {
    let mut rx = state.shutdown.clone();
    async move {
        let _ = rx.wait_for(|stopping| *stopping).await;
    }
}

/// Board views for `viewer`, one per board change once the board is ready
pub fn board_views(
    rx: watch::Receiver<Arc<Board>>,
    viewer: Option<UserId>,
    clock: Arc<dyn Clock>,
) -> impl Stream<Item = BoardView> + Send + 'static {
    stream::unfold((rx, true), move |(mut rx, mut first)| {
        let clock = Arc::clone(&clock);
        async move {
            loop {
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                first = false;

                let view = rx.borrow_and_update().view(viewer, clock.now());
                if let Some(view) = view {
                    return Some((view, (rx, false)));
                }
            }
        }
    })
}

/// Server-sent stream of the board, pushed on every change
pub async fn live_board(
    State(state): State<AppState>,
    viewer: Option<Extension<Viewer>>,
) -> impl IntoResponse {
    let views = board_views(
        state.controller.watch(),
        viewer_id(&viewer),
        Arc::clone(&state.clock),
    );
    let events = views
        .map(|view| SseEvent::default().event("board").json_data(view))
        .take_until(shutdown_started(&state));

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// One event with its responses and aggregate
pub async fn get_event(
    State(state): State<AppState>,
    viewer: Option<Extension<Viewer>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let details = state
        .event_service
        .event_card(viewer_id(&viewer), id, state.clock.now())
        .await?;

    Ok(Json(details))
}

/// Create an event
pub async fn create_event(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Json(form): Json<EventForm>,
) -> ApiResult<impl IntoResponse> {
    let event = state
        .event_service
        .create_event(&viewer, &form, state.clock.today())
        .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// Delete an event created by the caller
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.event_service.delete_event(&viewer, id).await?;
    state.controller.event_deleted(id).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Answer an event
pub async fn respond(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> ApiResult<impl IntoResponse> {
    let aggregate = state
        .event_service
        .respond(&viewer, id, payload.response)
        .await?;

    Ok(Json(aggregate))
}

/// Server-sent stream of the caller's notifications
pub async fn notifications(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> impl IntoResponse {
    info!("{} subscribed to notifications", viewer.email);

    let feed = NotificationFeed::new(Arc::clone(&state.store), viewer);
    let events = stream::unfold(feed, |mut feed| async move {
        let notification = feed.next().await?;
        let event = SseEvent::default()
            .event("notification")
            .json_data(NotificationPayload {
                message: notification.message(),
                notification: &notification,
            });
        Some((event, feed))
    })
    .take_until(shutdown_started(&state));

    Sse::new(events).keep_alive(KeepAlive::default())
}
