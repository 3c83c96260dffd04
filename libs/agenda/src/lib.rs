//! Events, RSVPs and the live event board
//!
//! This crate holds everything the services share about after-work events:
//!
//! - the domain model and the store contract with PostgreSQL and in-memory
//!   implementations
//! - pure aggregation of responses and categorization of upcoming events
//! - the live refresh controller keeping a board in sync with store changes
//! - user actions (create, respond, delete) and per-user notifications

pub mod aggregate;
pub mod board;
pub mod categorize;
pub mod clock;
pub mod error;
pub mod models;
pub mod notify;
pub mod refresh;
pub mod service;
pub mod store;
pub mod validation;

pub use aggregate::{Aggregate, aggregate};
pub use board::{Board, BoardView, CalendarEntry, EventCard, EventDetails, Phase};
pub use categorize::{BoardStats, Buckets, categorize};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{AgendaError, StoreError, StoreResult, ValidationError};
pub use models::{Event, EventId, EventResponse, Profile, ResponseKind, UserId, Viewer};
pub use notify::{Notification, NotificationFeed};
pub use refresh::{LiveRefreshController, RefreshHandle};
pub use service::{AgendaResult, EventService};
pub use store::{EventStore, memory::MemoryStore, postgres::PgEventStore};
pub use validation::EventForm;
