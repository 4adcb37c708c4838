//! Pure moderation transition function.
//!
//! The transition function takes an event record and a moderation input and
//! returns the updated record plus a list of effects. It has NO side effects:
//! the store persists the record and the interpreter executes the effects.
//!
//! Each concern has its own handler module with co-located tests:
//! - `content`: creation, edits, reclassification and classifier results
//! - `reports`: report-count threshold and administrator overrides
//! - `lifecycle`: time-based expiry

mod content;
mod lifecycle;
mod reports;

pub use reports::next_reports_state;

use chrono::{DateTime, Utc};

use super::effect::Effect;
use super::event::ModerationEvent;
use super::state::Event;

/// Result of a moderation transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    /// The record after the transition.
    pub event: Event,
    /// Effects to execute.
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(event: Event, effects: Vec<Effect>) -> Self {
        Self { event, effects }
    }

    pub fn no_change(event: Event) -> Self {
        Self {
            event,
            effects: vec![],
        }
    }
}

/// Pure moderation transition function.
///
/// `now` is the instant the input is applied at; it drives lifecycle
/// recomputation and `updated_at`.
pub fn transition(event: Event, input: ModerationEvent, now: DateTime<Utc>) -> TransitionResult {
    match input {
        ModerationEvent::Created
        | ModerationEvent::Edited
        | ModerationEvent::ReclassifyRequested
        | ModerationEvent::ClassificationFinished { .. }
        | ModerationEvent::ClassificationFailed { .. } => content::handle(event, input, now),
        ModerationEvent::ReportCountChanged { .. } | ModerationEvent::AdminSetReportsState { .. } => {
            reports::handle(event, input, now)
        }
        ModerationEvent::Expired => lifecycle::handle(event, now),
    }
}

/// Classification request for the record's current content.
fn classify_effect(event: &Event) -> Effect {
    Effect::Classify {
        revision: event.revision,
        title: event.title.clone(),
        description: event.description.clone(),
    }
}

/// An unsaved event as submitted, before the `Created` transition.
#[cfg(test)]
fn draft_event(now: DateTime<Utc>, end_in: chrono::Duration) -> Event {
    use super::state::{EventId, Lifecycle, ModerationStatus, ReportsState, UserId};

    Event {
        id: EventId::UNASSIGNED,
        owner: UserId(7),
        title: "Han River 10k".to_string(),
        description: "Community run along the river".to_string(),
        start_at: now,
        end_at: now + end_in,
        status: ModerationStatus::Pending,
        lifecycle: Lifecycle::Active,
        reports_count: 0,
        reports_state: ReportsState::Normal,
        revision: 0,
        created_at: now,
        updated_at: now,
    }
}
