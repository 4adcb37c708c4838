//! Community-moderation transitions: the report threshold and administrator
//! overrides.

use chrono::{DateTime, Utc};

use super::TransitionResult;
use crate::state_machine::effect::Effect;
use crate::state_machine::event::ModerationEvent;
use crate::state_machine::state::{Event, ReportsState, REPORT_THRESHOLD};

/// Reports state after the active report count moved from `previous` to
/// `count`.
///
/// - `blocked` is sticky; only an administrator clears it.
/// - Reaching the threshold holds the event (`pending`).
/// - A held event returns to `normal` only when the count drops back below
///   the threshold.
pub fn next_reports_state(current: ReportsState, previous: u32, count: u32) -> ReportsState {
    match current {
        ReportsState::Blocked => ReportsState::Blocked,
        _ if count >= REPORT_THRESHOLD => ReportsState::Pending,
        ReportsState::Pending if count < previous => ReportsState::Normal,
        other => other,
    }
}

/// Handle report-count changes and administrator overrides.
pub fn handle(event: Event, input: ModerationEvent, now: DateTime<Utc>) -> TransitionResult {
    match input {
        ModerationEvent::ReportCountChanged { previous, count } => {
            let mut next = event;
            let current = next.reports_state;
            next.reports_count = count;
            next.reports_state = next_reports_state(current, previous, count);
            next.updated_at = now;

            let mut effects = Vec::new();
            match (current, next.reports_state) {
                (ReportsState::Normal, ReportsState::Pending) => {
                    effects.push(Effect::warn(format!(
                        "Event {} reached {} reports; held for review",
                        next.id, count
                    )));
                }
                (ReportsState::Pending, ReportsState::Normal) => {
                    effects.extend(reset_to_normal(&mut next));
                }
                _ => {}
            }

            TransitionResult::new(next, effects)
        }

        ModerationEvent::AdminSetReportsState { state } => {
            let mut next = event;
            let current = next.reports_state;
            next.updated_at = now;

            let mut effects = vec![Effect::info(format!(
                "Administrator set reports state of event {}: {} -> {}",
                next.id, current, state
            ))];
            if state == ReportsState::Normal {
                effects.extend(reset_to_normal(&mut next));
            } else {
                next.reports_state = state;
            }

            TransitionResult::new(next, effects)
        }

        other => TransitionResult::new(
            event,
            vec![Effect::warn(format!(
                "Reports handler received unrelated input {}",
                other.log_summary()
            ))],
        ),
    }
}

/// Entering `normal` by any path discards every report for the event.
fn reset_to_normal(event: &mut Event) -> Vec<Effect> {
    let discarded = event.reports_count;
    event.reports_state = ReportsState::Normal;
    event.reports_count = 0;
    vec![
        Effect::info(format!(
            "Event {} back to normal; discarding {} report(s)",
            event.id, discarded
        )),
        Effect::ClearReports,
    ]
}
