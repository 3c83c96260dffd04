//! In-memory event store
//!
//! Mirrors the PostgreSQL store's constraints (unique profile ids, unique
//! (event, user) responses, responses referencing an existing event) and
//! publishes the same change notifications. Operations can be made to fail
//! on demand.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{StoreError, StoreResult},
    models::{
        Event, EventId, EventResponse, NewEvent, NewProfile, NewResponse, PersonSummary, Profile,
        UserId,
    },
    store::{ChangeFeed, ChangeKind, ChangeNotification, Collection, EventFilter, EventStore, Subscription},
};

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListEvents,
    GetEvent,
    InsertEvent,
    DeleteEvent,
    ListResponses,
    UpsertResponse,
    DeleteResponses,
    InsertProfile,
    GetProfile,
}

#[derive(Debug, Default)]
struct MemoryState {
    profiles: HashMap<UserId, Profile>,
    events: HashMap<EventId, Event>,
    responses: Vec<EventResponse>,
    failing: HashSet<Operation>,
}

impl MemoryState {
    fn check(&self, operation: Operation) -> StoreResult<()> {
        if self.failing.contains(&operation) {
            return Err(StoreError::Unavailable(format!("{:?} failed", operation)));
        }
        Ok(())
    }

    fn summary(&self, user_id: UserId) -> Option<PersonSummary> {
        self.profiles.get(&user_id).map(Profile::summary)
    }

    fn with_creator(&self, mut event: Event) -> Event {
        event.creator = self.summary(event.creator_id);
        event
    }

    fn with_responder(&self, mut response: EventResponse) -> EventResponse {
        response.responder = self.summary(response.user_id);
        response
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` fail until [`MemoryStore::recover`] is called
    pub async fn fail(&self, operation: Operation) {
        self.state.lock().await.failing.insert(operation);
    }

    pub async fn recover(&self, operation: Operation) {
        self.state.lock().await.failing.remove(&operation);
    }

    /// Number of stored responses across all events
    pub async fn response_count(&self) -> usize {
        self.state.lock().await.responses.len()
    }

    fn publish<T: serde::Serialize>(&self, collection: Collection, kind: ChangeKind, record: &T) {
        self.feed
            .publish(ChangeNotification::new(collection, kind, record));
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn list_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let state = self.state.lock().await;
        state.check(Operation::ListEvents)?;

        let mut events: Vec<Event> = state
            .events
            .values()
            .filter(|event| filter.from_date.is_none_or(|from| event.date >= from))
            .map(|event| state.with_creator(event.clone()))
            .collect();
        events.sort_by_key(|event| (event.date, event.time, event.id));

        Ok(events)
    }

    async fn get_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        let state = self.state.lock().await;
        state.check(Operation::GetEvent)?;

        Ok(state
            .events
            .get(&id)
            .map(|event| state.with_creator(event.clone())))
    }

    async fn insert_event(&self, new_event: NewEvent) -> StoreResult<Event> {
        let mut state = self.state.lock().await;
        state.check(Operation::InsertEvent)?;

        if !state.profiles.contains_key(&new_event.creator_id) {
            return Err(StoreError::Constraint(format!(
                "creator {} has no profile",
                new_event.creator_id
            )));
        }

        let event = Event {
            id: Uuid::new_v4(),
            title: new_event.title,
            description: new_event.description,
            date: new_event.date,
            time: new_event.time,
            location: new_event.location,
            creator_id: new_event.creator_id,
            max_participants: new_event.max_participants,
            created_at: Utc::now(),
            creator: None,
        };
        state.events.insert(event.id, event.clone());
        let event = state.with_creator(event);
        drop(state);

        self.publish(Collection::Events, ChangeKind::Insert, &event);
        Ok(event)
    }

    async fn delete_event(&self, id: EventId, creator_id: UserId) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        state.check(Operation::DeleteEvent)?;

        let owned = state
            .events
            .get(&id)
            .is_some_and(|event| event.creator_id == creator_id);
        if !owned {
            return Ok(false);
        }

        if state.responses.iter().any(|r| r.event_id == id) {
            return Err(StoreError::Constraint(format!(
                "event {} is still referenced by responses",
                id
            )));
        }

        let removed = state.events.remove(&id);
        drop(state);

        if let Some(event) = removed {
            self.publish(Collection::Events, ChangeKind::Delete, &event);
        }
        Ok(true)
    }

    async fn list_responses(&self, event_ids: &[EventId]) -> StoreResult<Vec<EventResponse>> {
        let state = self.state.lock().await;
        state.check(Operation::ListResponses)?;

        let mut responses: Vec<EventResponse> = state
            .responses
            .iter()
            .filter(|r| event_ids.contains(&r.event_id))
            .map(|r| state.with_responder(r.clone()))
            .collect();
        responses.sort_by_key(|r| (r.created_at, r.id));

        Ok(responses)
    }

    async fn upsert_response(&self, new_response: NewResponse) -> StoreResult<EventResponse> {
        let mut state = self.state.lock().await;
        state.check(Operation::UpsertResponse)?;

        if !state.events.contains_key(&new_response.event_id) {
            return Err(StoreError::Constraint(format!(
                "event {} does not exist",
                new_response.event_id
            )));
        }

        let existing = state.responses.iter_mut().find(|r| {
            r.event_id == new_response.event_id && r.user_id == new_response.user_id
        });

        let (kind, stored) = match existing {
            Some(response) => {
                response.response = new_response.response;
                (ChangeKind::Update, response.clone())
            }
            None => {
                let response = EventResponse {
                    id: Uuid::new_v4(),
                    event_id: new_response.event_id,
                    user_id: new_response.user_id,
                    response: new_response.response,
                    created_at: Utc::now(),
                    responder: None,
                };
                state.responses.push(response.clone());
                (ChangeKind::Insert, response)
            }
        };
        let stored = state.with_responder(stored);
        drop(state);

        self.publish(Collection::EventResponses, kind, &stored);
        Ok(stored)
    }

    async fn delete_responses(&self, event_id: EventId) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        state.check(Operation::DeleteResponses)?;

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.responses)
            .into_iter()
            .partition(|r| r.event_id == event_id);
        state.responses = kept;
        drop(state);

        for response in &removed {
            self.publish(Collection::EventResponses, ChangeKind::Delete, response);
        }
        Ok(removed.len() as u64)
    }

    async fn insert_profile(&self, new_profile: NewProfile) -> StoreResult<Profile> {
        let mut state = self.state.lock().await;
        state.check(Operation::InsertProfile)?;

        if state.profiles.contains_key(&new_profile.id) {
            return Err(StoreError::Duplicate(format!(
                "profile {} already exists",
                new_profile.id
            )));
        }

        let profile = Profile {
            id: new_profile.id,
            email: new_profile.email,
            name: new_profile.name,
            avatar_url: None,
            created_at: Utc::now(),
        };
        state.profiles.insert(profile.id, profile.clone());
        drop(state);

        self.publish(Collection::Profiles, ChangeKind::Insert, &profile);
        Ok(profile)
    }

    async fn get_profile(&self, id: UserId) -> StoreResult<Option<Profile>> {
        let state = self.state.lock().await;
        state.check(Operation::GetProfile)?;
        Ok(state.profiles.get(&id).cloned())
    }

    fn subscribe(&self, collections: &[Collection]) -> Subscription {
        self.feed.subscribe(collections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResponseKind;
    use chrono::{NaiveDate, NaiveTime};
    use tokio_test::{assert_err, assert_ok};

    async fn store_with_profile() -> (MemoryStore, UserId) {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store
            .insert_profile(NewProfile {
                id: user,
                email: "alice@example.com".to_string(),
                name: "alice".to_string(),
            })
            .await
            .unwrap();
        (store, user)
    }

    fn new_event(creator_id: UserId, day: u32) -> NewEvent {
        NewEvent {
            title: format!("Drinks #{}", day),
            description: None,
            date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            location: "The Crown".to_string(),
            creator_id,
            max_participants: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (store, user) = store_with_profile().await;
        let event = store.insert_event(new_event(user, 20)).await.unwrap();
        let submission = NewResponse {
            event_id: event.id,
            user_id: user,
            response: ResponseKind::Yes,
        };

        let first = store.upsert_response(submission).await.unwrap();
        let second = store.upsert_response(submission).await.unwrap();

        assert_eq!(first.id, second.id);
        let responses = store.list_responses(&[event.id]).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].response, ResponseKind::Yes);
        assert_eq!(responses[0].responder.as_ref().unwrap().name, "alice");
    }

    #[tokio::test]
    async fn test_upsert_overwrites_previous_answer() {
        let (store, user) = store_with_profile().await;
        let event = store.insert_event(new_event(user, 20)).await.unwrap();

        for kind in [ResponseKind::Yes, ResponseKind::No] {
            store
                .upsert_response(NewResponse {
                    event_id: event.id,
                    user_id: user,
                    response: kind,
                })
                .await
                .unwrap();
        }

        let responses = store.list_responses(&[event.id]).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].response, ResponseKind::No);
    }

    #[tokio::test]
    async fn test_list_events_filters_and_orders() {
        let (store, user) = store_with_profile().await;
        let late = store.insert_event(new_event(user, 25)).await.unwrap();
        let early = store.insert_event(new_event(user, 18)).await.unwrap();
        store.insert_event(new_event(user, 2)).await.unwrap();

        let events = store
            .list_events(&EventFilter::upcoming(NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()))
            .await
            .unwrap();

        let ids: Vec<_> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
        assert_eq!(events[0].creator.as_ref().unwrap().name, "alice");
    }

    #[tokio::test]
    async fn test_delete_requires_creator_and_no_responses() {
        let (store, user) = store_with_profile().await;
        let event = store.insert_event(new_event(user, 20)).await.unwrap();
        store
            .upsert_response(NewResponse {
                event_id: event.id,
                user_id: user,
                response: ResponseKind::Maybe,
            })
            .await
            .unwrap();

        assert!(!store.delete_event(event.id, Uuid::new_v4()).await.unwrap());
        assert_err!(store.delete_event(event.id, user).await);

        assert_eq!(store.delete_responses(event.id).await.unwrap(), 1);
        assert!(assert_ok!(store.delete_event(event.id, user).await));
        assert!(store.get_event(event.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_profile() {
        let (store, user) = store_with_profile().await;

        let err = store
            .insert_profile(NewProfile {
                id: user,
                email: "alice@example.com".to_string(),
                name: "someone else".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_writes_are_published() {
        let (store, user) = store_with_profile().await;
        let mut subscription = store.subscribe(&[Collection::Events, Collection::EventResponses]);

        let event = store.insert_event(new_event(user, 20)).await.unwrap();
        store
            .upsert_response(NewResponse {
                event_id: event.id,
                user_id: user,
                response: ResponseKind::Yes,
            })
            .await
            .unwrap();

        let inserted = subscription.recv().await.unwrap();
        assert_eq!(inserted.collection, Collection::Events);
        assert_eq!(inserted.kind, ChangeKind::Insert);
        assert_eq!(inserted.decode::<Event>().unwrap().id, event.id);

        let answered = subscription.recv().await.unwrap();
        assert_eq!(answered.collection, Collection::EventResponses);
        assert_eq!(answered.event_id(), Some(event.id));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (store, _) = store_with_profile().await;

        store.fail(Operation::ListEvents).await;
        assert!(matches!(
            store.list_events(&EventFilter::default()).await,
            Err(StoreError::Unavailable(_))
        ));

        store.recover(Operation::ListEvents).await;
        assert_ok!(store.list_events(&EventFilter::default()).await);
    }
}
