//! Shared snapshot of the event board
//!
//! A [`Board`] holds the upcoming events and their responses as last loaded
//! by the refresh controller. Views are derived per viewer on demand.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::HashMap;

use crate::{
    aggregate::{Aggregate, aggregate},
    categorize::{BoardStats, Buckets, categorize, is_imminent},
    models::{Event, EventId, EventResponse, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Default)]
pub struct Board {
    pub phase: Phase,
    /// Set when the latest refresh failed and the data is from an older one
    pub stale: bool,
    pub events: Vec<Event>,
    pub responses: HashMap<EventId, Vec<EventResponse>>,
    pub last_error: Option<String>,
}

impl Board {
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn contains(&self, event_id: EventId) -> bool {
        self.events.iter().any(|event| event.id == event_id)
    }

    pub fn event(&self, event_id: EventId) -> Option<&Event> {
        self.events.iter().find(|event| event.id == event_id)
    }

    pub fn responses_for(&self, event_id: EventId) -> &[EventResponse] {
        self.responses
            .get(&event_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn card(&self, event: &Event, viewer: Option<UserId>, now: NaiveDateTime) -> EventCard {
        EventCard::new(event.clone(), self.responses_for(event.id), viewer, now)
    }

    /// Calendar entries of every event on the board in start order, `None`
    /// until the first load completes
    pub fn calendar(&self) -> Option<Vec<CalendarEntry>> {
        if !self.is_ready() {
            return None;
        }

        let mut entries: Vec<CalendarEntry> = self.events.iter().map(CalendarEntry::from).collect();
        entries.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
        Some(entries)
    }

    /// Categorized cards for `viewer`, `None` until the first load completes
    pub fn view(&self, viewer: Option<UserId>, now: NaiveDateTime) -> Option<BoardView> {
        if !self.is_ready() {
            return None;
        }

        let buckets = categorize(self.events.iter().cloned(), now)
            .map(|event| self.card(&event, viewer, now));

        Some(BoardView {
            stats: buckets.stats(),
            buckets,
            stale: self.stale,
        })
    }
}

/// Length given to every event on the calendar
pub const CALENDAR_EVENT_HOURS: i64 = 2;

/// An event as placed on the calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEntry {
    pub id: EventId,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl From<&Event> for CalendarEntry {
    fn from(event: &Event) -> Self {
        let start = event.starts_at();
        Self {
            id: event.id,
            title: event.title.clone(),
            start,
            end: start + Duration::hours(CALENDAR_EVENT_HOURS),
        }
    }
}

/// An event as rendered on the board
#[derive(Debug, Clone, Serialize)]
pub struct EventCard {
    #[serde(flatten)]
    pub event: Event,
    pub aggregate: Aggregate,
    pub imminent: bool,
}

impl EventCard {
    pub fn new(
        event: Event,
        responses: &[EventResponse],
        viewer: Option<UserId>,
        now: NaiveDateTime,
    ) -> Self {
        let aggregate = aggregate(responses, viewer, event.capacity());
        let imminent = is_imminent(&event, now);
        Self {
            event,
            aggregate,
            imminent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    #[serde(flatten)]
    pub buckets: Buckets<EventCard>,
    pub stats: BoardStats,
    pub stale: bool,
}

/// One event with its aggregate and every response
#[derive(Debug, Clone, Serialize)]
pub struct EventDetails {
    #[serde(flatten)]
    pub card: EventCard,
    pub responses: Vec<EventResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResponseKind;
    use chrono::{Duration, NaiveDate, Utc};
    use uuid::Uuid;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 17)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn event_in(offset: Duration, capacity: Option<i32>) -> Event {
        let starts_at = now() + offset;
        Event {
            id: Uuid::new_v4(),
            title: "Drinks".to_string(),
            description: None,
            date: starts_at.date(),
            time: starts_at.time(),
            location: "Rooftop".to_string(),
            creator_id: Uuid::new_v4(),
            max_participants: capacity,
            created_at: Utc::now(),
            creator: None,
        }
    }

    #[test]
    fn test_calendar_spans_two_hours() {
        let mut board = Board::default();
        assert!(board.calendar().is_none());

        let later = event_in(Duration::days(3), None);
        let sooner = event_in(Duration::hours(2), None);
        board.events = vec![later.clone(), sooner.clone()];
        board.phase = Phase::Ready;

        let entries = board.calendar().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, sooner.id);
        assert_eq!(entries[0].start, now() + Duration::hours(2));
        assert_eq!(entries[0].end, now() + Duration::hours(4));
        assert_eq!(entries[1].id, later.id);

        let json = serde_json::to_value(&entries[1]).unwrap();
        assert_eq!(json["title"], "Drinks");
        assert_eq!(json["start"], "2026-10-20T09:00:00");
        assert_eq!(json["end"], "2026-10-20T11:00:00");
    }

    #[test]
    fn test_view_requires_ready_board() {
        let board = Board::default();
        assert!(board.view(None, now()).is_none());
    }

    #[test]
    fn test_view_attaches_aggregates() {
        let viewer = Uuid::new_v4();
        let tonight = event_in(Duration::hours(9), Some(2));
        let next_month = event_in(Duration::days(30), None);

        let mut board = Board {
            phase: Phase::Ready,
            events: vec![next_month.clone(), tonight.clone()],
            ..Board::default()
        };
        board.responses.insert(
            tonight.id,
            vec![EventResponse {
                id: Uuid::new_v4(),
                event_id: tonight.id,
                user_id: viewer,
                response: ResponseKind::Yes,
                created_at: Utc::now(),
                responder: None,
            }],
        );

        let view = board.view(Some(viewer), now()).unwrap();
        assert_eq!(view.stats.total_events, 2);
        assert!(!view.stale);

        let card = &view.buckets.imminent[0];
        assert!(card.imminent);
        assert_eq!(card.event.id, tonight.id);
        assert_eq!(card.aggregate.yes_count, 1);
        assert_eq!(card.aggregate.viewer_response, Some(ResponseKind::Yes));
        assert_eq!(card.aggregate.participation_rate, 50.0);

        assert_eq!(view.buckets.later[0].aggregate.yes_count, 0);
        assert!(board.responses_for(next_month.id).is_empty());
    }

    #[test]
    fn test_view_serializes_flat() {
        let board = Board {
            phase: Phase::Ready,
            stale: true,
            events: vec![event_in(Duration::days(2), None)],
            ..Board::default()
        };

        let json = serde_json::to_value(board.view(None, now()).unwrap()).unwrap();
        assert_eq!(json["stale"], true);
        assert_eq!(json["stats"]["this_week"], 1);
        assert_eq!(json["this_week"][0]["title"], "Drinks");
        assert_eq!(json["this_week"][0]["aggregate"]["is_full"], false);
    }
}
