//! Errors returned by moderation operations.

use std::fmt;

use crate::state_machine::repository::RepositoryError;
use crate::state_machine::state::EventId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationError {
    /// Caller input was rejected before anything was written.
    Validation(String),
    /// The user already has an active report for this event.
    AlreadyReported,
    /// The user has no active report for this event.
    NoSuchReport,
    NotFound(EventId),
    /// The actor may not perform this action on the event.
    Forbidden(String),
    Repository(RepositoryError),
}

impl fmt::Display for ModerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "invalid input: {}", message),
            Self::AlreadyReported => write!(f, "event already reported by this user"),
            Self::NoSuchReport => write!(f, "no active report by this user"),
            Self::NotFound(id) => write!(f, "event {} not found", id),
            Self::Forbidden(reason) => write!(f, "forbidden: {}", reason),
            Self::Repository(e) => write!(f, "repository error: {}", e),
        }
    }
}

impl std::error::Error for ModerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Repository(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RepositoryError> for ModerationError {
    fn from(e: RepositoryError) -> Self {
        Self::Repository(e)
    }
}
