//! Per-user notifications derived from the change feed
//!
//! A signed-in user hears about events organized by others and about new
//! answers to the events they created. Their own writes never notify them.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::{
    error::StoreResult,
    models::{Event, EventId, EventResponse, ResponseKind, UserId, Viewer},
    store::{ChangeKind, ChangeNotification, Collection, EventStore, Subscription},
};

const UNKNOWN_CREATOR: &str = "A colleague";
const UNKNOWN_RESPONDER: &str = "Someone";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    NewEvent {
        event_id: EventId,
        title: String,
        creator: String,
    },
    NewResponse {
        event_id: EventId,
        title: String,
        responder: String,
        response: ResponseKind,
    },
}

impl Notification {
    pub fn message(&self) -> String {
        match self {
            Notification::NewEvent { title, creator, .. } => {
                format!("{} organized a new after-work: {}", creator, title)
            }
            Notification::NewResponse {
                title,
                responder,
                response,
                ..
            } => {
                let verb = match response {
                    ResponseKind::Yes => "will attend",
                    ResponseKind::No => "will not attend",
                    ResponseKind::Maybe => "might attend",
                };
                format!("{} {} your event {}", responder, verb, title)
            }
        }
    }
}

async fn display_name(store: &dyn EventStore, user_id: UserId, fallback: &str) -> String {
    match store.get_profile(user_id).await {
        Ok(Some(profile)) => profile.name,
        Ok(None) => fallback.to_string(),
        Err(e) => {
            warn!("Could not load profile {}: {}", user_id, e);
            fallback.to_string()
        }
    }
}

/// Notification `viewer` should receive for `change`, if any
pub async fn notification_for(
    store: &dyn EventStore,
    viewer: &Viewer,
    change: &ChangeNotification,
) -> StoreResult<Option<Notification>> {
    if change.kind != ChangeKind::Insert {
        return Ok(None);
    }

    match change.collection {
        Collection::Events => {
            let event: Event = change.decode()?;
            if event.creator_id == viewer.id {
                return Ok(None);
            }

            let creator = display_name(store, event.creator_id, UNKNOWN_CREATOR).await;
            Ok(Some(Notification::NewEvent {
                event_id: event.id,
                title: event.title,
                creator,
            }))
        }
        Collection::EventResponses => {
            let response: EventResponse = change.decode()?;
            if response.user_id == viewer.id {
                return Ok(None);
            }

            let event = match store.get_event(response.event_id).await? {
                Some(event) if event.creator_id == viewer.id => event,
                _ => return Ok(None),
            };

            let responder = display_name(store, response.user_id, UNKNOWN_RESPONDER).await;
            Ok(Some(Notification::NewResponse {
                event_id: event.id,
                title: event.title,
                responder,
                response: response.response,
            }))
        }
        Collection::Profiles => Ok(None),
    }
}

/// Stream of notifications for one viewer. Dropping it unsubscribes.
pub struct NotificationFeed {
    store: Arc<dyn EventStore>,
    viewer: Viewer,
    subscription: Subscription,
}

impl NotificationFeed {
    pub fn new(store: Arc<dyn EventStore>, viewer: Viewer) -> Self {
        let subscription = store.subscribe(&[Collection::Events, Collection::EventResponses]);
        Self {
            store,
            viewer,
            subscription,
        }
    }

    /// Next notification, `None` once the change feed is closed
    pub async fn next(&mut self) -> Option<Notification> {
        loop {
            let change = match self.subscription.recv().await {
                Ok(change) => change,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Notification feed of {} skipped {} changes", self.viewer.id, skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            };

            match notification_for(self.store.as_ref(), &self.viewer, &change).await {
                Ok(Some(notification)) => return Some(notification),
                Ok(None) => {}
                Err(e) => warn!("Dropping notification: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{NewEvent, NewProfile, NewResponse},
        store::memory::MemoryStore,
    };
    use chrono::{NaiveDate, NaiveTime};
    use std::time::Duration;
    use uuid::Uuid;

    async fn viewer(store: &MemoryStore, name: &str) -> Viewer {
        let id = Uuid::new_v4();
        let email = format!("{}@corp.com", name);
        store
            .insert_profile(NewProfile {
                id,
                email: email.clone(),
                name: name.to_string(),
            })
            .await
            .unwrap();
        Viewer {
            id,
            email,
            name: name.to_string(),
        }
    }

    fn new_event(creator_id: UserId) -> NewEvent {
        NewEvent {
            title: "Karaoke".to_string(),
            description: None,
            date: NaiveDate::from_ymd_opt(2026, 10, 23).unwrap(),
            time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            location: "Studio 54".to_string(),
            creator_id,
            max_participants: None,
        }
    }

    #[test]
    fn test_messages() {
        let event_id = Uuid::new_v4();
        let organized = Notification::NewEvent {
            event_id,
            title: "Karaoke".to_string(),
            creator: "Ana".to_string(),
        };
        assert_eq!(organized.message(), "Ana organized a new after-work: Karaoke");

        let declined = Notification::NewResponse {
            event_id,
            title: "Karaoke".to_string(),
            responder: "Ben".to_string(),
            response: ResponseKind::No,
        };
        assert_eq!(declined.message(), "Ben will not attend your event Karaoke");
    }

    #[tokio::test]
    async fn test_new_event_notifies_others_only() {
        let store = MemoryStore::new();
        let ana = viewer(&store, "ana").await;
        let ben = viewer(&store, "ben").await;

        let event = store.insert_event(new_event(ana.id)).await.unwrap();
        let change = ChangeNotification::new(Collection::Events, ChangeKind::Insert, &event);

        assert_eq!(notification_for(&store, &ana, &change).await.unwrap(), None);

        let notification = notification_for(&store, &ben, &change).await.unwrap().unwrap();
        assert_eq!(notification.message(), "ana organized a new after-work: Karaoke");
    }

    #[tokio::test]
    async fn test_responses_notify_the_creator() {
        let store = MemoryStore::new();
        let ana = viewer(&store, "ana").await;
        let ben = viewer(&store, "ben").await;
        let cleo = viewer(&store, "cleo").await;

        let event = store.insert_event(new_event(ana.id)).await.unwrap();
        let response = store
            .upsert_response(NewResponse {
                event_id: event.id,
                user_id: ben.id,
                response: ResponseKind::Maybe,
            })
            .await
            .unwrap();
        let change = ChangeNotification::new(Collection::EventResponses, ChangeKind::Insert, &response);

        let notification = notification_for(&store, &ana, &change).await.unwrap().unwrap();
        assert_eq!(notification.message(), "ben might attend your event Karaoke");

        assert_eq!(notification_for(&store, &ben, &change).await.unwrap(), None);
        assert_eq!(notification_for(&store, &cleo, &change).await.unwrap(), None);

        let update = ChangeNotification::new(Collection::EventResponses, ChangeKind::Update, &response);
        assert_eq!(notification_for(&store, &ana, &update).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resync_is_silent() {
        let store = MemoryStore::new();
        let ana = viewer(&store, "ana").await;

        let change = ChangeNotification::resync();
        assert_eq!(notification_for(&store, &ana, &change).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_creator_falls_back() {
        let store = MemoryStore::new();
        let ana = viewer(&store, "ana").await;
        let record = serde_json::json!({
            "id": Uuid::new_v4(),
            "title": "Ghost party",
            "date": "2026-10-31",
            "time": "21:00:00",
            "location": "Attic",
            "creator_id": Uuid::new_v4(),
            "created_at": "2026-10-17T10:00:00Z"
        });
        let change = ChangeNotification {
            collection: Collection::Events,
            kind: ChangeKind::Insert,
            record,
        };

        let notification = notification_for(&store, &ana, &change).await.unwrap().unwrap();
        assert_eq!(notification.message(), "A colleague organized a new after-work: Ghost party");
    }

    #[tokio::test]
    async fn test_feed_delivers_relevant_changes() {
        let store = Arc::new(MemoryStore::new());
        let ana = viewer(&store, "ana").await;
        let ben = viewer(&store, "ben").await;
        let mut feed = NotificationFeed::new(store.clone(), ben.clone());

        store.insert_event(new_event(ben.id)).await.unwrap();
        store.insert_event(new_event(ana.id)).await.unwrap();

        let notification = tokio::time::timeout(Duration::from_secs(5), feed.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            notification,
            Notification::NewEvent { ref creator, .. } if creator == "ana"
        ));
    }
}
