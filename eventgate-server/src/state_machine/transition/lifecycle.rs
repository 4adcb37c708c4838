//! Time-driven transitions.

use chrono::{DateTime, Utc};

use super::TransitionResult;
use crate::state_machine::effect::Effect;
use crate::state_machine::state::{Event, Lifecycle};

/// Handle an expiry candidate.
///
/// The sweep selects candidates before taking the event lock, so the record
/// may have been edited since. The end time is re-checked against `now` on
/// the record passed in; anything still open or already inactive is left
/// alone.
pub fn handle(event: Event, now: DateTime<Utc>) -> TransitionResult {
    if event.lifecycle == Lifecycle::Inactive || event.end_at >= now {
        return TransitionResult::no_change(event);
    }

    let mut next = event;
    next.lifecycle = Lifecycle::Inactive;
    next.updated_at = now;

    let effects = vec![Effect::info(format!(
        "Event {} ended at {}; marked inactive",
        next.id, next.end_at
    ))];
    TransitionResult::new(next, effects)
}

#[cfg(test)]
mod tests {
    use super::super::{draft_event, transition};
    use super::*;
    use crate::state_machine::event::ModerationEvent;
    use crate::state_machine::state::ModerationStatus;
    use chrono::Duration;

    #[test]
    fn test_expired_marks_inactive() {
        let now = Utc::now();
        let event = transition(
            draft_event(now, Duration::hours(1)),
            ModerationEvent::Created,
            now,
        )
        .event;

        let later = now + Duration::hours(2);
        let result = transition(event, ModerationEvent::Expired, later);

        assert_eq!(result.event.lifecycle, Lifecycle::Inactive);
        assert_eq!(result.event.updated_at, later);
        assert_eq!(result.effects.len(), 1);
    }

    #[test]
    fn test_expired_is_idempotent() {
        let now = Utc::now();
        let later = now + Duration::hours(2);
        let event = transition(
            draft_event(now, Duration::hours(1)),
            ModerationEvent::Created,
            now,
        )
        .event;
        let once = transition(event, ModerationEvent::Expired, later).event;

        let twice = transition(once.clone(), ModerationEvent::Expired, later);

        assert_eq!(twice.event, once);
        assert!(twice.effects.is_empty());
    }

    #[test]
    fn test_expired_rechecks_end_time() {
        // Candidate selected, then edited to end in the future before the
        // sweep reached it.
        let now = Utc::now();
        let event = transition(
            draft_event(now, Duration::days(2)),
            ModerationEvent::Created,
            now,
        )
        .event;

        let result = transition(event.clone(), ModerationEvent::Expired, now);

        assert_eq!(result.event, event);
        assert!(result.effects.is_empty());
    }

    #[test]
    fn test_expired_keeps_moderation_fields() {
        let now = Utc::now();
        let mut event = transition(
            draft_event(now, Duration::hours(1)),
            ModerationEvent::Created,
            now,
        )
        .event;
        event.status = ModerationStatus::Spam;
        event.reports_count = 2;

        let result = transition(event, ModerationEvent::Expired, now + Duration::days(1));

        assert_eq!(result.event.status, ModerationStatus::Spam);
        assert_eq!(result.event.reports_count, 2);
    }
}
