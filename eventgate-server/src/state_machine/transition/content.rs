//! Content transitions: creation, edits, reclassification and classifier
//! results.

use chrono::{DateTime, Utc};

use super::{classify_effect, TransitionResult};
use crate::state_machine::effect::{Effect, LogLevel};
use crate::state_machine::event::ModerationEvent;
use crate::state_machine::state::{Event, Lifecycle, ModerationStatus, ReportsState};

/// Handle inputs that concern the event's content and its classification.
///
/// Every content change restarts moderation: status goes back to `pending`,
/// the revision is bumped, and classification of the new revision is queued.
pub fn handle(event: Event, input: ModerationEvent, now: DateTime<Utc>) -> TransitionResult {
    match input {
        ModerationEvent::Created => {
            let mut next = event;
            next.status = ModerationStatus::Pending;
            next.lifecycle = Lifecycle::at(next.end_at, now);
            next.reports_count = 0;
            next.reports_state = ReportsState::Normal;
            next.revision = 1;
            next.created_at = now;
            next.updated_at = now;

            let effects = vec![classify_effect(&next)];
            TransitionResult::new(next, effects)
        }

        ModerationEvent::Edited => {
            let previous_status = event.status;
            let mut next = restart_moderation(event, now);
            next.lifecycle = Lifecycle::at(next.end_at, now);

            let effects = vec![
                Effect::info(format!(
                    "Event {} edited; status {} -> pending (revision {})",
                    next.id, previous_status, next.revision
                )),
                classify_effect(&next),
            ];
            TransitionResult::new(next, effects)
        }

        ModerationEvent::ReclassifyRequested => {
            let next = restart_moderation(event, now);
            let effects = vec![
                Effect::info(format!(
                    "Reclassification requested for event {} (revision {})",
                    next.id, next.revision
                )),
                classify_effect(&next),
            ];
            TransitionResult::new(next, effects)
        }

        ModerationEvent::ClassificationFinished { revision, is_spam } => {
            if revision != event.revision {
                let message = format!(
                    "Discarding verdict for event {} revision {} (current revision {})",
                    event.id, revision, event.revision
                );
                return TransitionResult::new(event, vec![Effect::info(message)]);
            }

            let mut next = event;
            next.status = if is_spam {
                ModerationStatus::Spam
            } else {
                ModerationStatus::Approved
            };
            next.updated_at = now;

            let effects = vec![Effect::info(format!(
                "Event {} classified as {}",
                next.id, next.status
            ))];
            TransitionResult::new(next, effects)
        }

        ModerationEvent::ClassificationFailed { revision, error } => {
            // The record is left untouched: a failed classification must not
            // decide the status either way.
            let effect = if revision == event.revision {
                Effect::error(format!(
                    "Classification failed for event {} revision {}; status stays pending: {}",
                    event.id, revision, error
                ))
            } else {
                Effect::Log {
                    level: LogLevel::Debug,
                    message: format!(
                        "Ignoring classification failure for superseded revision {} of event {}",
                        revision, event.id
                    ),
                }
            };
            TransitionResult::new(event, vec![effect])
        }

        other => TransitionResult::new(
            event,
            vec![Effect::warn(format!(
                "Content handler received unrelated input {}",
                other.log_summary()
            ))],
        ),
    }
}

fn restart_moderation(event: Event, now: DateTime<Utc>) -> Event {
    let mut next = event;
    next.status = ModerationStatus::Pending;
    next.revision += 1;
    next.updated_at = now;
    next
}
