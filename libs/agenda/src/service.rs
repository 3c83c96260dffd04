//! User actions on events and responses

use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    aggregate::{Aggregate, aggregate},
    board::{EventCard, EventDetails},
    error::AgendaError,
    models::{Event, EventId, NewProfile, NewResponse, Profile, ResponseKind, UserId, Viewer},
    store::EventStore,
    validation::{EventForm, validate_event_form},
};

pub type AgendaResult<T> = Result<T, AgendaError>;

/// Display name for a new profile: the given name, or the local part of
/// the email address when none is given
pub fn default_display_name(email: &str, name: Option<&str>) -> String {
    match name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => name.to_string(),
        None => email.split('@').next().unwrap_or(email).to_string(),
    }
}

#[derive(Clone)]
pub struct EventService {
    store: Arc<dyn EventStore>,
}

impl EventService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    async fn require_event(&self, event_id: EventId) -> AgendaResult<Event> {
        self.store
            .get_event(event_id)
            .await?
            .ok_or(AgendaError::EventNotFound(event_id))
    }

    pub async fn create_event(
        &self,
        viewer: &Viewer,
        form: &EventForm,
        today: NaiveDate,
    ) -> AgendaResult<Event> {
        let new_event = validate_event_form(form, viewer.id, today)?;
        let event = self.store.insert_event(new_event).await?;
        info!("{} created event {}", viewer.email, event.id);
        Ok(event)
    }

    /// Event with its responses and the viewer's aggregate
    pub async fn event_card(
        &self,
        viewer: Option<UserId>,
        event_id: EventId,
        now: NaiveDateTime,
    ) -> AgendaResult<EventDetails> {
        let event = self.require_event(event_id).await?;
        let responses = self.store.list_responses(&[event_id]).await?;

        Ok(EventDetails {
            card: EventCard::new(event, &responses, viewer, now),
            responses,
        })
    }

    /// Record the viewer's answer and return the event's new aggregate
    ///
    /// The capacity check and the upsert are separate store calls with no
    /// lock between them, so concurrent `yes` answers on the last free spot
    /// can both pass and leave the event above capacity.
    pub async fn respond(
        &self,
        viewer: &Viewer,
        event_id: EventId,
        kind: ResponseKind,
    ) -> AgendaResult<Aggregate> {
        let event = self.require_event(event_id).await?;
        let responses = self.store.list_responses(&[event_id]).await?;

        let current = aggregate(&responses, Some(viewer.id), event.capacity());
        if !current.accepts(kind) {
            return Err(AgendaError::EventFull);
        }

        self.store
            .upsert_response(NewResponse {
                event_id,
                user_id: viewer.id,
                response: kind,
            })
            .await?;

        let responses = self.store.list_responses(&[event_id]).await?;
        Ok(aggregate(&responses, Some(viewer.id), event.capacity()))
    }

    /// Delete an event created by the viewer, its responses first
    pub async fn delete_event(&self, viewer: &Viewer, event_id: EventId) -> AgendaResult<()> {
        let event = self.require_event(event_id).await?;
        if !event.is_created_by(viewer.id) {
            return Err(AgendaError::NotCreator);
        }

        let removed = self.store.delete_responses(event_id).await?;

        match self.store.delete_event(event_id, viewer.id).await {
            Ok(true) => {
                info!("Deleted event {} and {} responses", event_id, removed);
                Ok(())
            }
            Ok(false) => {
                warn!("Event {} vanished before it could be deleted", event_id);
                Err(AgendaError::EventNotFound(event_id))
            }
            Err(e) => {
                error!(
                    "Removed {} responses of event {} but failed to delete it: {}",
                    removed, event_id, e
                );
                Err(e.into())
            }
        }
    }

    /// Create the profile of a new account. A profile that already exists
    /// (created by the database trigger) is not an error and yields `None`.
    pub async fn register_profile(
        &self,
        user_id: UserId,
        email: &str,
        name: Option<&str>,
    ) -> AgendaResult<Option<Profile>> {
        let new_profile = NewProfile {
            id: user_id,
            email: email.to_string(),
            name: default_display_name(email, name),
        };

        match self.store.insert_profile(new_profile).await {
            Ok(profile) => Ok(Some(profile)),
            Err(e) if e.is_duplicate() => {
                info!("Profile of {} already exists", user_id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
