//! Event creation form validation

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use crate::{
    error::ValidationError,
    models::{NewEvent, UserId},
};

/// Smallest capacity the form accepts
pub const MIN_PARTICIPANTS: i32 = 2;

pub const MAX_TITLE_CHARS: usize = 120;
pub const MAX_LOCATION_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Raw event form as submitted
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventForm {
    pub title: String,
    pub description: Option<String>,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM` or `HH:MM:SS`
    pub time: String,
    pub location: String,
    pub max_participants: Option<i32>,
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Missing(field));
    }
    Ok(value.to_string())
}

fn bounded(value: String, field: &'static str, max: usize) -> Result<String, ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(value)
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

/// Check `form` and turn it into an insertable event for `creator_id`
pub fn validate_event_form(
    form: &EventForm,
    creator_id: UserId,
    today: NaiveDate,
) -> Result<NewEvent, ValidationError> {
    let title = bounded(required(&form.title, "title")?, "title", MAX_TITLE_CHARS)?;

    let date = required(&form.date, "date")?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| ValidationError::Invalid("date"))?;
    if date < today {
        return Err(ValidationError::DateInPast(date));
    }

    let time = required(&form.time, "time")?;
    let time = parse_time(&time).ok_or(ValidationError::Invalid("time"))?;

    let location = bounded(
        required(&form.location, "location")?,
        "location",
        MAX_LOCATION_CHARS,
    )?;

    if let Some(max) = form.max_participants {
        if max < MIN_PARTICIPANTS {
            return Err(ValidationError::CapacityTooSmall(max));
        }
    }

    let description = form
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| bounded(d.to_string(), "description", MAX_DESCRIPTION_CHARS))
        .transpose()?;

    Ok(NewEvent {
        title,
        description,
        date,
        time,
        location,
        creator_id,
        max_participants: form.max_participants,
    })
}
