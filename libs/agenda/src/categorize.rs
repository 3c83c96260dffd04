//! Partition upcoming events into time horizons
//!
//! An event is *imminent* when it starts less than 24 hours from now, falls
//! into *this week* when it starts within the next 7 days (inclusive), and
//! is *later* otherwise. Events starting at or before `now` are dropped.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::models::Event;

pub const IMMINENT_WINDOW_HOURS: i64 = 24;
pub const THIS_WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    Imminent,
    ThisWeek,
    Later,
}

/// Horizon of an instant relative to `now`, `None` when it is not in the future
pub fn horizon(starts_at: NaiveDateTime, now: NaiveDateTime) -> Option<Horizon> {
    if starts_at <= now {
        return None;
    }

    if starts_at - now < Duration::hours(IMMINENT_WINDOW_HOURS) {
        return Some(Horizon::Imminent);
    }

    let within_week = now
        .checked_add_signed(Duration::days(THIS_WEEK_DAYS))
        .is_none_or(|limit| starts_at <= limit);

    if within_week {
        Some(Horizon::ThisWeek)
    } else {
        Some(Horizon::Later)
    }
}

pub fn is_imminent(event: &Event, now: NaiveDateTime) -> bool {
    horizon(event.starts_at(), now) == Some(Horizon::Imminent)
}

/// Three disjoint buckets, each ordered by start then identifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Buckets<T = Event> {
    pub imminent: Vec<T>,
    pub this_week: Vec<T>,
    pub later: Vec<T>,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self {
            imminent: Vec::new(),
            this_week: Vec::new(),
            later: Vec::new(),
        }
    }
}

impl<T> Buckets<T> {
    pub fn len(&self) -> usize {
        self.imminent.len() + self.this_week.len() + self.later.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> BoardStats {
        BoardStats {
            total_events: self.len(),
            imminent: self.imminent.len(),
            this_week: self.this_week.len(),
            later: self.later.len(),
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Buckets<U> {
        Buckets {
            imminent: self.imminent.into_iter().map(&mut f).collect(),
            this_week: self.this_week.into_iter().map(&mut f).collect(),
            later: self.later.into_iter().map(&mut f).collect(),
        }
    }
}

/// Bucket sizes shown next to the board tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BoardStats {
    pub total_events: usize,
    pub imminent: usize,
    pub this_week: usize,
    pub later: usize,
}

/// Partition `events` relative to `now`
pub fn categorize<I>(events: I, now: NaiveDateTime) -> Buckets<Event>
where
    I: IntoIterator<Item = Event>,
{
    let mut buckets = Buckets::default();

    for event in events {
        match horizon(event.starts_at(), now) {
            Some(Horizon::Imminent) => buckets.imminent.push(event),
            Some(Horizon::ThisWeek) => buckets.this_week.push(event),
            Some(Horizon::Later) => buckets.later.push(event),
            None => {}
        }
    }

    for bucket in [
        &mut buckets.imminent,
        &mut buckets.this_week,
        &mut buckets.later,
    ] {
        bucket.sort_by_key(|event| (event.starts_at(), event.id));
    }

    buckets
}
