//! Domain model for events, responses and profiles

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

pub type EventId = Uuid;
pub type UserId = Uuid;

/// A user's answer to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Yes,
    No,
    Maybe,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Yes => "yes",
            ResponseKind::No => "no",
            ResponseKind::Maybe => "maybe",
        }
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown response kind: {0}")]
pub struct ParseResponseKindError(pub String);

impl FromStr for ResponseKind {
    type Err = ParseResponseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(ResponseKind::Yes),
            "no" => Ok(ResponseKind::No),
            "maybe" => Ok(ResponseKind::Maybe),
            other => Err(ParseResponseKindError(other.to_string())),
        }
    }
}

/// Name and avatar of a profile, joined onto events and responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A scheduled after-work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub creator_id: UserId,
    #[serde(default)]
    pub max_participants: Option<i32>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<PersonSummary>,
}

impl Event {
    /// Local instant at which the event starts
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Capacity for aggregation. A stored negative value counts as zero.
    pub fn capacity(&self) -> Option<u32> {
        self.max_participants
            .map(|max| u32::try_from(max).unwrap_or(0))
    }

    pub fn is_created_by(&self, user_id: UserId) -> bool {
        self.creator_id == user_id
    }
}

/// A user's RSVP to one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub event_id: EventId,
    pub user_id: UserId,
    pub response: ResponseKind,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder: Option<PersonSummary>,
}

/// Public profile of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn summary(&self) -> PersonSummary {
        PersonSummary {
            name: self.name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Validated event creation payload
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub creator_id: UserId,
    pub max_participants: Option<i32>,
}

/// Response submission, upserted on (event_id, user_id)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewResponse {
    pub event_id: EventId,
    pub user_id: UserId,
    pub response: ResponseKind,
}

/// Profile creation payload
#[derive(Debug, Clone, PartialEq)]
pub struct NewProfile {
    pub id: UserId,
    pub email: String,
    pub name: String,
}

/// The authenticated user a request acts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: UserId,
    pub email: String,
    pub name: String,
}
