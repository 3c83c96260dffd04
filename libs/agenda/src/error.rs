//! Error types of the agenda library

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::EventId;

/// Failure reported by an event store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A unique constraint rejected the write
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// A referential constraint rejected the write
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Malformed record: {0}")]
    Decode(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Duplicate(db.message().to_string());
            }
            if db.is_foreign_key_violation() {
                return StoreError::Constraint(db.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Rejected event form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{0} is not valid")]
    Invalid(&'static str),

    #[error("date {0} is in the past")]
    DateInPast(NaiveDate),

    #[error("max participants must be at least 2, got {0}")]
    CapacityTooSmall(i32),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
}

/// Failure of a user action
#[derive(Error, Debug)]
pub enum AgendaError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Event {0} not found")]
    EventNotFound(EventId),

    #[error("Only the creator may delete this event")]
    NotCreator,

    #[error("Event is full")]
    EventFull,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
