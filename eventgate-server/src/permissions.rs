//! Who may change an event.

use crate::error::ModerationError;
use crate::state_machine::state::{Event, ModerationStatus, ReportsState, UserId};

/// The user performing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Actor {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }
}

/// Check whether `actor` may edit or delete `event`.
///
/// Administrators bypass every gate. Other users must own the event, and may
/// not touch it while it awaits classification or is held by reports.
pub fn check_can_modify(actor: &Actor, event: &Event) -> Result<(), ModerationError> {
    if actor.is_admin {
        return Ok(());
    }

    if event.owner != actor.user_id {
        return Err(ModerationError::Forbidden(format!(
            "user {} does not own event {}",
            actor.user_id, event.id
        )));
    }

    if event.status == ModerationStatus::Pending {
        return Err(ModerationError::Forbidden(format!(
            "event {} is awaiting moderation",
            event.id
        )));
    }

    match event.reports_state {
        ReportsState::Normal => Ok(()),
        ReportsState::Pending => Err(ModerationError::Forbidden(format!(
            "event {} is held for review after reports",
            event.id
        ))),
        ReportsState::Blocked => Err(ModerationError::Forbidden(format!(
            "event {} was blocked by an administrator",
            event.id
        ))),
    }
}
