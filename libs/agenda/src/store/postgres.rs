//! PostgreSQL event store
//!
//! Reads join the author's profile onto each row. Change notifications come
//! from the `publish_change` trigger over `LISTEN nextdrink_changes` and are
//! fanned out to subscribers by [`PgEventStore::start_listener`].

use async_trait::async_trait;
use sqlx::{
    PgPool, Row,
    postgres::{PgListener, PgRow},
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    error::{StoreError, StoreResult},
    models::{
        Event, EventId, EventResponse, NewEvent, NewProfile, NewResponse, PersonSummary, Profile,
        ResponseKind, UserId,
    },
    store::{ChangeFeed, ChangeNotification, Collection, EventFilter, EventStore, Subscription},
};

/// Channel the change triggers notify on
pub const CHANGE_CHANNEL: &str = "nextdrink_changes";

const EVENT_COLUMNS: &str = r#"
    e.id, e.title, e.description, e.date, e.time, e.location, e.creator_id,
    e.max_participants, e.created_at,
    p.name AS creator_name, p.avatar_url AS creator_avatar_url
"#;

const RESPONSE_COLUMNS: &str = r#"
    r.id, r.event_id, r.user_id, r.response, r.created_at,
    p.name AS responder_name, p.avatar_url AS responder_avatar_url
"#;

fn person(row: &PgRow, name: &str, avatar: &str) -> StoreResult<Option<PersonSummary>> {
    let name: Option<String> = row.try_get(name)?;
    let avatar_url: Option<String> = row.try_get(avatar)?;
    Ok(name.map(|name| PersonSummary { name, avatar_url }))
}

fn event_from_row(row: &PgRow) -> StoreResult<Event> {
    Ok(Event {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        date: row.try_get("date")?,
        time: row.try_get("time")?,
        location: row.try_get("location")?,
        creator_id: row.try_get("creator_id")?,
        max_participants: row.try_get("max_participants")?,
        created_at: row.try_get("created_at")?,
        creator: person(row, "creator_name", "creator_avatar_url")?,
    })
}

fn response_from_row(row: &PgRow) -> StoreResult<EventResponse> {
    let kind: String = row.try_get("response")?;
    let response = kind
        .parse::<ResponseKind>()
        .map_err(|e| StoreError::Decode(e.to_string()))?;

    Ok(EventResponse {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        user_id: row.try_get("user_id")?,
        response,
        created_at: row.try_get("created_at")?,
        responder: person(row, "responder_name", "responder_avatar_url")?,
    })
}

fn forward(feed: &ChangeFeed, payload: &str) {
    match serde_json::from_str::<ChangeNotification>(payload) {
        Ok(change) => feed.publish(change),
        Err(e) => warn!("Ignoring malformed change notification: {}", e),
    }
}

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    feed: ChangeFeed,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            feed: ChangeFeed::default(),
        }
    }

    /// Listen on [`CHANGE_CHANNEL`] and forward every notification to the
    /// store's subscribers.
    ///
    /// Notifications sent while the listener connection is down are lost, so
    /// subscribers get a [`ChangeNotification::resync`] after every lost
    /// connection and when the task ends.
    pub async fn start_listener(&self) -> StoreResult<JoinHandle<()>> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        info!("Listening for changes on {}", CHANGE_CHANNEL);

        let feed = self.feed.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.try_recv().await {
                    Ok(Some(notification)) => forward(&feed, notification.payload()),
                    Ok(None) => {
                        warn!("Change listener connection lost, reconnecting");
                        // Any query reconnects and listens again.
                        if let Err(e) = sqlx::query("SELECT 1").execute(&mut listener).await {
                            error!("Change listener could not reconnect: {}", e);
                            feed.publish(ChangeNotification::resync());
                            break;
                        }
                        info!("Change listener reconnected");
                        feed.publish(ChangeNotification::resync());
                    }
                    Err(e) => {
                        error!("Change listener stopped: {}", e);
                        feed.publish(ChangeNotification::resync());
                        break;
                    }
                }
            }
        });

        Ok(handle)
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn list_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events e
            LEFT JOIN profiles p ON p.id = e.creator_id
            WHERE $1::date IS NULL OR e.date >= $1
            ORDER BY e.date, e.time, e.id
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(filter.from_date)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn get_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events e
            LEFT JOIN profiles p ON p.id = e.creator_id
            WHERE e.id = $1
            "#
        );

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event> {
        info!("Creating event '{}' on {}", event.title, event.date);

        let sql = format!(
            r#"
            WITH e AS (
                INSERT INTO events (title, description, date, time, location, creator_id, max_participants)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
            )
            SELECT {EVENT_COLUMNS}
            FROM e
            LEFT JOIN profiles p ON p.id = e.creator_id
            "#
        );

        let row = sqlx::query(&sql)
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.date)
            .bind(event.time)
            .bind(&event.location)
            .bind(event.creator_id)
            .bind(event.max_participants)
            .fetch_one(&self.pool)
            .await?;

        event_from_row(&row)
    }

    async fn delete_event(&self, id: EventId, creator_id: UserId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1 AND creator_id = $2")
            .bind(id)
            .bind(creator_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_responses(&self, event_ids: &[EventId]) -> StoreResult<Vec<EventResponse>> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {RESPONSE_COLUMNS}
            FROM event_responses r
            LEFT JOIN profiles p ON p.id = r.user_id
            WHERE r.event_id = ANY($1)
            ORDER BY r.created_at, r.id
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(event_ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(response_from_row).collect()
    }

    async fn upsert_response(&self, response: NewResponse) -> StoreResult<EventResponse> {
        let sql = format!(
            r#"
            WITH r AS (
                INSERT INTO event_responses (event_id, user_id, response)
                VALUES ($1, $2, $3)
                ON CONFLICT (event_id, user_id) DO UPDATE SET response = EXCLUDED.response
                RETURNING *
            )
            SELECT {RESPONSE_COLUMNS}
            FROM r
            LEFT JOIN profiles p ON p.id = r.user_id
            "#
        );

        let row = sqlx::query(&sql)
            .bind(response.event_id)
            .bind(response.user_id)
            .bind(response.response.as_str())
            .fetch_one(&self.pool)
            .await?;

        response_from_row(&row)
    }

    async fn delete_responses(&self, event_id: EventId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM event_responses WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_profile(&self, profile: NewProfile) -> StoreResult<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, email, name)
            VALUES ($1, $2, $3)
            RETURNING id, email, name, avatar_url, created_at
            "#,
        )
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.name)
        .fetch_one(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn get_profile(&self, id: UserId) -> StoreResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT id, email, name, avatar_url, created_at FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    fn subscribe(&self, collections: &[Collection]) -> Subscription {
        self.feed.subscribe(collections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChangeKind;

    #[tokio::test]
    async fn test_forward_publishes_valid_payloads_only() {
        let feed = ChangeFeed::default();
        let mut subscription = feed.subscribe(&[Collection::Events]);

        forward(&feed, "not json");
        forward(
            &feed,
            r#"{"collection":"events","kind":"DELETE","record":{"id":"0f8fad5b-d9cb-469f-a165-70867728950e"}}"#,
        );

        let change = subscription.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
        assert_eq!(
            change.event_id(),
            Some("0f8fad5b-d9cb-469f-a165-70867728950e".parse().unwrap())
        );
    }
}
