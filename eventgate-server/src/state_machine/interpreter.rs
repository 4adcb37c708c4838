//! Effect interpreter.
//!
//! The interpreter is the boundary between the pure state machine and the
//! outside world. Effects that belong to the record write
//! (`Effect::is_part_of_write`) have already been applied by the store by the
//! time the interpreter runs; everything else is carried out here.

use tracing::{debug, error, info, warn};

use super::effect::{Effect, LogLevel};
use super::state::EventId;
use crate::dispatch::{ClassificationJob, ClassificationQueue};

/// Execute the effects of a committed transition for `event_id`.
pub fn execute_effects(event_id: EventId, effects: Vec<Effect>, queue: &ClassificationQueue) {
    for effect in effects {
        execute_effect(event_id, effect, queue);
    }
}

fn execute_effect(event_id: EventId, effect: Effect, queue: &ClassificationQueue) {
    match effect {
        Effect::Classify {
            revision,
            title,
            description,
        } => {
            queue.enqueue(ClassificationJob {
                event_id,
                revision,
                title,
                description,
            });
        }

        Effect::ClearReports => {
            debug!("Reports for event {} cleared with the record write", event_id);
        }

        Effect::Log { level, message } => match level {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        },
    }
}
