//! Event store client contract
//!
//! The store owns events, responses and profiles and publishes every write
//! as a [`ChangeNotification`]. Subscribers hold a [`Subscription`]; dropping
//! it unsubscribes.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::{
    error::{StoreError, StoreResult},
    models::{Event, EventId, EventResponse, NewEvent, NewProfile, NewResponse, Profile, UserId},
};

pub mod memory;
pub mod postgres;

/// Buffered notifications per subscriber before it starts lagging
pub const CHANGE_FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Events,
    EventResponses,
    Profiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One write on a watched collection. `record` is the new row, or the old
/// row for deletions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub record: serde_json::Value,
}

impl ChangeNotification {
    pub fn new<T: Serialize>(collection: Collection, kind: ChangeKind, record: &T) -> Self {
        Self {
            collection,
            kind,
            record: serde_json::to_value(record).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Placeholder for changes that may have been missed, for example while
    /// the store's listener was reconnecting. Subscribers reload the events
    /// collection when they receive it.
    pub fn resync() -> Self {
        Self {
            collection: Collection::Events,
            kind: ChangeKind::Update,
            record: serde_json::Value::Null,
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(self.record.clone()).map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Event the changed record belongs to
    pub fn event_id(&self) -> Option<EventId> {
        let field = match self.collection {
            Collection::Events => "id",
            Collection::EventResponses => "event_id",
            Collection::Profiles => return None,
        };
        self.record
            .get(field)
            .and_then(|value| value.as_str())
            .and_then(|value| value.parse().ok())
    }
}

/// Filter for [`EventStore::list_events`]. Results are always ordered by
/// date, then time.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only events on or after this date
    pub from_date: Option<NaiveDate>,
}

impl EventFilter {
    pub fn upcoming(today: NaiveDate) -> Self {
        Self {
            from_date: Some(today),
        }
    }
}

/// Fan-out of change notifications to every subscriber
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeNotification>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(CHANGE_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, change: ChangeNotification) {
        if self.tx.send(change).is_err() {
            debug!("change published with no subscribers");
        }
    }

    pub fn subscribe(&self, collections: &[Collection]) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            collections: collections.to_vec(),
        }
    }
}

/// Receiving end of a change feed, limited to some collections
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ChangeNotification>,
    collections: Vec<Collection>,
}

impl Subscription {
    /// Next notification on a subscribed collection
    pub async fn recv(&mut self) -> Result<ChangeNotification, RecvError> {
        loop {
            let change = self.rx.recv().await?;
            if self.collections.contains(&change.collection) {
                return Ok(change);
            }
        }
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn list_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>>;

    async fn get_event(&self, id: EventId) -> StoreResult<Option<Event>>;

    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event>;

    /// Delete the event if `creator_id` created it. Returns whether a row went away.
    async fn delete_event(&self, id: EventId, creator_id: UserId) -> StoreResult<bool>;

    /// Responses of the given events, oldest first
    async fn list_responses(&self, event_ids: &[EventId]) -> StoreResult<Vec<EventResponse>>;

    /// Insert or overwrite the response of (event, user)
    async fn upsert_response(&self, response: NewResponse) -> StoreResult<EventResponse>;

    /// Delete every response of an event. Returns the number removed.
    async fn delete_responses(&self, event_id: EventId) -> StoreResult<u64>;

    async fn insert_profile(&self, profile: NewProfile) -> StoreResult<Profile>;

    async fn get_profile(&self, id: UserId) -> StoreResult<Option<Profile>>;

    fn subscribe(&self, collections: &[Collection]) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_subscription_filters_collections() {
        let feed = ChangeFeed::default();
        let mut events_only = feed.subscribe(&[Collection::Events]);

        let event_id = Uuid::new_v4();
        feed.publish(ChangeNotification {
            collection: Collection::EventResponses,
            kind: ChangeKind::Insert,
            record: serde_json::json!({ "event_id": event_id }),
        });
        feed.publish(ChangeNotification {
            collection: Collection::Events,
            kind: ChangeKind::Delete,
            record: serde_json::json!({ "id": event_id }),
        });

        let change = events_only.recv().await.unwrap();
        assert_eq!(change.collection, Collection::Events);
        assert_eq!(change.kind, ChangeKind::Delete);
        assert_eq!(change.event_id(), Some(event_id));
    }

    #[test]
    fn test_notification_payload_format() {
        let payload = r#"{"collection":"event_responses","kind":"INSERT","record":{"event_id":"0f8fad5b-d9cb-469f-a165-70867728950e","response":"yes"}}"#;

        let change: ChangeNotification = serde_json::from_str(payload).unwrap();
        assert_eq!(change.collection, Collection::EventResponses);
        assert_eq!(change.kind, ChangeKind::Insert);
        assert_eq!(
            change.event_id(),
            Some("0f8fad5b-d9cb-469f-a165-70867728950e".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn test_resync_reaches_event_subscribers() {
        let feed = ChangeFeed::default();
        let mut events_only = feed.subscribe(&[Collection::Events]);

        feed.publish(ChangeNotification::resync());

        let change = events_only.recv().await.unwrap();
        assert_eq!(change.collection, Collection::Events);
        assert_ne!(change.kind, ChangeKind::Insert);
        assert_eq!(change.event_id(), None);
    }

    #[test]
    fn test_decode_reports_malformed_records() {
        let change = ChangeNotification {
            collection: Collection::Events,
            kind: ChangeKind::Insert,
            record: serde_json::json!({ "id": "not-an-event" }),
        };

        assert!(matches!(change.decode::<Event>(), Err(StoreError::Decode(_))));
        assert_eq!(change.event_id(), None);
    }
}
