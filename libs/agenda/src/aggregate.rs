//! Participation summary of one event

use serde::Serialize;

use crate::models::{EventResponse, ResponseKind, UserId};

/// Counts and capacity state derived from an event's responses
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aggregate {
    pub yes_count: usize,
    pub no_count: usize,
    pub maybe_count: usize,
    pub viewer_response: Option<ResponseKind>,
    pub capacity: Option<u32>,
    pub is_full: bool,
    /// `100 * yes / capacity`, not clamped; 0 without a capacity
    pub participation_rate: f64,
}

impl Aggregate {
    /// Spots left before the event is full, `None` when unbounded
    pub fn remaining_spots(&self) -> Option<u32> {
        self.capacity.map(|capacity| {
            let taken = u32::try_from(self.yes_count).unwrap_or(u32::MAX);
            capacity.saturating_sub(taken)
        })
    }

    /// Whether the viewer may submit `kind`. A full event refuses new "yes"
    /// answers but a viewer already counted as "yes" may resubmit it.
    pub fn accepts(&self, kind: ResponseKind) -> bool {
        kind != ResponseKind::Yes
            || !self.is_full
            || self.viewer_response == Some(ResponseKind::Yes)
    }
}

/// Summarize the responses of exactly one event for `viewer`
pub fn aggregate(
    responses: &[EventResponse],
    viewer: Option<UserId>,
    capacity: Option<u32>,
) -> Aggregate {
    let mut yes_count = 0;
    let mut no_count = 0;
    let mut maybe_count = 0;
    let mut latest_from_viewer: Option<&EventResponse> = None;

    for response in responses {
        match response.response {
            ResponseKind::Yes => yes_count += 1,
            ResponseKind::No => no_count += 1,
            ResponseKind::Maybe => maybe_count += 1,
        }

        if viewer == Some(response.user_id)
            && latest_from_viewer.is_none_or(|current| response.created_at >= current.created_at)
        {
            latest_from_viewer = Some(response);
        }
    }

    let (is_full, participation_rate) = match capacity {
        None => (false, 0.0),
        Some(0) => (true, 100.0),
        Some(capacity) => (
            yes_count as u64 >= u64::from(capacity),
            yes_count as f64 * 100.0 / f64::from(capacity),
        ),
    };

    Aggregate {
        yes_count,
        no_count,
        maybe_count,
        viewer_response: latest_from_viewer.map(|response| response.response),
        capacity,
        is_full,
        participation_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    fn response(user_id: UserId, kind: ResponseKind, created_at: DateTime<Utc>) -> EventResponse {
        EventResponse {
            id: Uuid::new_v4(),
            event_id: Uuid::nil(),
            user_id,
            response: kind,
            created_at,
            responder: None,
        }
    }

    fn answers(kinds: &[ResponseKind]) -> Vec<EventResponse> {
        let now = Utc::now();
        kinds
            .iter()
            .map(|kind| response(Uuid::new_v4(), *kind, now))
            .collect()
    }

    #[test]
    fn test_full_at_capacity() {
        use ResponseKind::*;
        let responses = answers(&[Yes, Yes, No, Maybe]);

        let summary = aggregate(&responses, None, Some(2));
        assert_eq!(summary.yes_count, 2);
        assert_eq!(summary.no_count, 1);
        assert_eq!(summary.maybe_count, 1);
        assert!(summary.is_full);
        assert_eq!(summary.participation_rate, 100.0);
        assert_eq!(summary.remaining_spots(), Some(0));
    }

    #[test]
    fn test_unbounded_event_has_zero_rate() {
        use ResponseKind::*;
        let responses = answers(&[Yes, Yes, Yes]);

        let summary = aggregate(&responses, None, None);
        assert!(!summary.is_full);
        assert_eq!(summary.participation_rate, 0.0);
        assert_eq!(summary.remaining_spots(), None);
    }

    #[test]
    fn test_zero_capacity_is_always_full() {
        let summary = aggregate(&[], None, Some(0));
        assert!(summary.is_full);
        assert_eq!(summary.participation_rate, 100.0);

        let summary = aggregate(&answers(&[ResponseKind::No]), None, Some(0));
        assert!(summary.is_full);
        assert!(!summary.accepts(ResponseKind::Yes));
    }

    #[test]
    fn test_rate_is_not_clamped() {
        use ResponseKind::*;
        let summary = aggregate(&answers(&[Yes, Yes, Yes]), None, Some(2));
        assert_eq!(summary.participation_rate, 150.0);
        assert_eq!(summary.remaining_spots(), Some(0));
    }

    #[test]
    fn test_partial_rate() {
        use ResponseKind::*;
        let summary = aggregate(&answers(&[Yes, Maybe]), None, Some(4));
        assert!(!summary.is_full);
        assert_eq!(summary.participation_rate, 25.0);
        assert_eq!(summary.remaining_spots(), Some(3));
    }

    #[test]
    fn test_viewer_response_latest_wins() {
        let viewer = Uuid::new_v4();
        let now = Utc::now();
        let responses = vec![
            response(viewer, ResponseKind::Yes, now - Duration::minutes(5)),
            response(Uuid::new_v4(), ResponseKind::No, now),
            response(viewer, ResponseKind::Maybe, now),
        ];

        let summary = aggregate(&responses, Some(viewer), None);
        assert_eq!(summary.viewer_response, Some(ResponseKind::Maybe));

        let summary = aggregate(&responses, Some(Uuid::new_v4()), None);
        assert_eq!(summary.viewer_response, None);

        let summary = aggregate(&responses, None, None);
        assert_eq!(summary.viewer_response, None);
    }

    #[test]
    fn test_full_event_only_accepts_existing_yes() {
        let viewer = Uuid::new_v4();
        let now = Utc::now();
        let mut responses = answers(&[ResponseKind::Yes, ResponseKind::Yes]);

        let outsider = aggregate(&responses, Some(viewer), Some(3));
        assert!(outsider.accepts(ResponseKind::Yes));

        responses.push(response(viewer, ResponseKind::Yes, now));
        let insider = aggregate(&responses, Some(viewer), Some(3));
        assert!(insider.is_full);
        assert!(insider.accepts(ResponseKind::Yes));
        assert!(insider.accepts(ResponseKind::No));

        let latecomer = aggregate(&responses, Some(Uuid::new_v4()), Some(3));
        assert!(!latecomer.accepts(ResponseKind::Yes));
        assert!(latecomer.accepts(ResponseKind::Maybe));
    }
}
