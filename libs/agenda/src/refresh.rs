//! Live refresh controller
//!
//! Keeps the shared [`Board`] in sync with the store. Event changes trigger
//! a full reload of upcoming events; response changes on an event that is on
//! the board reload that event's responses only.
//!
//! Every fetch takes a ticket from one increasing counter when it starts.
//! A result is applied only if no fetch of the same scope started after it,
//! so the most recently started fetch decides the final board regardless of
//! the order in which fetches complete.

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, broadcast::error::RecvError, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    board::{Board, Phase},
    clock::Clock,
    error::StoreResult,
    models::{Event, EventId, EventResponse},
    store::{ChangeNotification, Collection, EventFilter, EventStore},
};

type Ticket = u64;

#[derive(Debug, Default)]
struct RefreshState {
    board: Board,
    next_ticket: Ticket,
    /// Latest started full refresh
    latest_full: Ticket,
    /// Latest started response refresh per event
    pending_responses: HashMap<EventId, Ticket>,
    /// Ticket of the fetch that produced each event's current responses
    response_tickets: HashMap<EventId, Ticket>,
    /// Locally deleted events, hidden from fetches with a lower ticket
    deleted: HashMap<EventId, Ticket>,
}

impl RefreshState {
    fn take_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn apply_full(
        &mut self,
        ticket: Ticket,
        events: Vec<Event>,
        mut responses: HashMap<EventId, Vec<EventResponse>>,
    ) {
        let deleted = &self.deleted;
        let events: Vec<Event> = events
            .into_iter()
            .filter(|event| deleted.get(&event.id).is_none_or(|mark| ticket >= *mark))
            .collect();
        self.deleted.retain(|_, mark| *mark > ticket);

        let mut board_responses = HashMap::with_capacity(events.len());
        for event in &events {
            let newer_applied = self
                .response_tickets
                .get(&event.id)
                .is_some_and(|applied| *applied > ticket);

            let items = if newer_applied {
                self.board.responses.remove(&event.id).unwrap_or_default()
            } else {
                self.response_tickets.insert(event.id, ticket);
                responses.remove(&event.id).unwrap_or_default()
            };
            board_responses.insert(event.id, items);
        }
        self.response_tickets
            .retain(|id, _| board_responses.contains_key(id));

        self.board.events = events;
        self.board.responses = board_responses;
        self.board.phase = Phase::Ready;
        self.board.stale = false;
        self.board.last_error = None;
    }
}

/// Handle of a running controller loop
pub struct RefreshHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop listening for changes and wait for the loop to exit
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.task.await {
            warn!("Live refresh task ended abnormally: {}", e);
        }
    }
}

pub struct LiveRefreshController {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<RefreshState>,
    board_tx: watch::Sender<Arc<Board>>,
}

impl LiveRefreshController {
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Arc<Self> {
        let (board_tx, _) = watch::channel(Arc::new(Board::default()));
        Arc::new(Self {
            store,
            clock,
            state: Mutex::new(RefreshState::default()),
            board_tx,
        })
    }

    /// Latest published board
    pub fn board(&self) -> Arc<Board> {
        Arc::clone(&self.board_tx.borrow())
    }

    /// Receiver notified on every board change
    pub fn watch(&self) -> watch::Receiver<Arc<Board>> {
        self.board_tx.subscribe()
    }

    /// Wait up to `timeout` for the board to reach [`Phase::Ready`]
    pub async fn wait_ready(&self, timeout: Duration) -> Option<Arc<Board>> {
        let mut rx = self.board_tx.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|board| board.is_ready())).await {
            Ok(Ok(board)) => Some(Arc::clone(&board)),
            _ => None,
        }
    }

    fn publish(&self, state: &RefreshState) {
        self.board_tx.send_replace(Arc::new(state.board.clone()));
    }

    /// Reload upcoming events and all their responses
    pub async fn refresh(&self) {
        let ticket = {
            let mut state = self.state.lock().await;
            let ticket = state.take_ticket();
            state.latest_full = ticket;
            state.board.phase = Phase::Loading;
            self.publish(&state);
            ticket
        };
        debug!("Full refresh #{} started", ticket);

        let result = self.fetch_board().await;

        let mut state = self.state.lock().await;
        if ticket != state.latest_full {
            debug!("Discarding superseded refresh #{}", ticket);
            return;
        }

        match result {
            Ok((events, responses)) => {
                debug!("Refresh #{} loaded {} events", ticket, events.len());
                state.apply_full(ticket, events, responses);
            }
            Err(e) => {
                error!("Failed to refresh events: {}", e);
                state.board.phase = Phase::Ready;
                state.board.stale = true;
                state.board.last_error = Some(e.to_string());
            }
        }
        self.publish(&state);
    }

    async fn fetch_board(&self) -> StoreResult<(Vec<Event>, HashMap<EventId, Vec<EventResponse>>)> {
        let filter = EventFilter::upcoming(self.clock.today());
        let events = self.store.list_events(&filter).await?;

        let ids: Vec<EventId> = events.iter().map(|event| event.id).collect();
        let mut responses: HashMap<EventId, Vec<EventResponse>> = HashMap::new();
        for response in self.store.list_responses(&ids).await? {
            responses.entry(response.event_id).or_default().push(response);
        }

        Ok((events, responses))
    }

    /// Reload the responses of one event on the board
    pub async fn refresh_responses(&self, event_id: EventId) {
        let ticket = {
            let mut state = self.state.lock().await;
            let ticket = state.take_ticket();
            state.pending_responses.insert(event_id, ticket);
            ticket
        };

        let result = self.store.list_responses(&[event_id]).await;

        let mut state = self.state.lock().await;
        if state.pending_responses.get(&event_id) != Some(&ticket) {
            debug!("Discarding superseded responses of {}", event_id);
            return;
        }
        state.pending_responses.remove(&event_id);

        match result {
            Ok(items) => {
                let newer_applied = state
                    .response_tickets
                    .get(&event_id)
                    .is_some_and(|applied| *applied > ticket);
                if newer_applied || !state.board.contains(event_id) {
                    return;
                }
                state.response_tickets.insert(event_id, ticket);
                state.board.responses.insert(event_id, items);
            }
            Err(e) => {
                error!("Failed to refresh responses of {}: {}", event_id, e);
                state.board.last_error = Some(e.to_string());
            }
        }
        self.publish(&state);
    }

    /// Drop an event the local user just deleted. Fetches that started
    /// before this call will not bring it back.
    pub async fn event_deleted(&self, event_id: EventId) {
        let mut state = self.state.lock().await;
        let mark = state.next_ticket + 1;
        state.deleted.insert(event_id, mark);

        state.board.events.retain(|event| event.id != event_id);
        state.board.responses.remove(&event_id);
        state.response_tickets.remove(&event_id);
        self.publish(&state);
    }

    fn spawn_refresh(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.refresh().await });
    }

    fn spawn_response_refresh(self: &Arc<Self>, event_id: EventId) {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.refresh_responses(event_id).await });
    }

    /// React to one store notification
    pub fn handle_change(self: &Arc<Self>, change: &ChangeNotification) {
        match change.collection {
            Collection::Events => self.spawn_refresh(),
            Collection::EventResponses => match change.event_id() {
                Some(event_id) => {
                    let (on_board, loading) = {
                        let board = self.board_tx.borrow();
                        (board.contains(event_id), board.phase == Phase::Loading)
                    };
                    if on_board {
                        self.spawn_response_refresh(event_id);
                    } else if loading {
                        // The running full refresh may have read this event's
                        // responses before the write.
                        debug!("Response change on {} during a full refresh", event_id);
                        self.spawn_refresh();
                    }
                }
                None => warn!("Response change without an event id"),
            },
            Collection::Profiles => {}
        }
    }

    /// Subscribe to the store, load the board and keep it current until the
    /// returned handle is shut down
    pub fn spawn(self: &Arc<Self>) -> RefreshHandle {
        let mut subscription = self
            .store
            .subscribe(&[Collection::Events, Collection::EventResponses]);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let controller = Arc::clone(self);

        let task = tokio::spawn(async move {
            info!("Live refresh started");
            controller.spawn_refresh();

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    change = subscription.recv() => match change {
                        Ok(change) => controller.handle_change(&change),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Missed {} changes, reloading board", skipped);
                            controller.spawn_refresh();
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            drop(subscription);
            info!("Live refresh stopped");
        });

        RefreshHandle {
            stop: Some(stop_tx),
            task,
        }
    }
}
