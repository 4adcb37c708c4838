//! Repository abstraction for event persistence.
//!
//! This module defines the `EventRepository` trait that abstracts storage of
//! event records and their reports. `InMemoryRepository` backs tests and
//! `SqliteRepository` backs the daemon; both must behave identically.

mod memory;
mod sqlite;

#[cfg(test)]
mod conformance;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::state::{Event, EventId, ModerationStatus, Report, UserId};

/// Error returned by repository operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The storage backend failed to carry out an operation.
    Storage { operation: String, message: String },
    /// A stored value could not be decoded.
    Corruption { what: String },
}

impl RepositoryError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { operation, message } => {
                write!(f, "storage error during {}: {}", operation, message)
            }
            Self::Corruption { what } => write!(f, "corrupt stored value: {}", what),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Outcome of an atomic report insert or removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportChange {
    /// The report row and the event's `reports_count` were changed together.
    Applied { previous: u32, count: u32 },
    /// The user already has an active report for the event.
    Duplicate,
    /// The user has no active report for the event.
    NoSuchReport,
    /// The event does not exist.
    EventMissing,
}

/// Repository trait for persisting events and reports.
///
/// Writes for a single event are serialized within one process by the
/// store's per-event lock. Other processes (the CLI next to the daemon) are
/// not, so each call must be atomic on its own and must not write a field
/// from a stale snapshot that another call owns.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert a new event and return its assigned id.
    ///
    /// The `id` field of the record passed in is ignored.
    async fn insert(&self, event: &Event) -> Result<EventId, RepositoryError>;

    /// Get an event, returning None if not found.
    async fn get(&self, id: EventId) -> Result<Option<Event>, RepositoryError>;

    /// Overwrite an existing event record and return it as stored.
    ///
    /// `reports_count` is owned by `add_report` / `remove_report` and is
    /// never taken from `event`: it is kept as stored, or reset to zero
    /// together with every report row when `clear_reports` is set. Returns
    /// None if the event no longer exists; nothing is written in that case.
    async fn update(
        &self,
        event: &Event,
        clear_reports: bool,
    ) -> Result<Option<Event>, RepositoryError>;

    /// Delete an event and its reports. Returns false if it did not exist.
    async fn delete(&self, id: EventId) -> Result<bool, RepositoryError>;

    /// Insert a report row and increment the event's `reports_count`.
    async fn add_report(&self, report: &Report) -> Result<ReportChange, RepositoryError>;

    /// Delete a report row and decrement the event's `reports_count`
    /// (never below zero).
    async fn remove_report(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<ReportChange, RepositoryError>;

    /// Active reports for an event, oldest first.
    async fn reports_for(&self, event_id: EventId) -> Result<Vec<Report>, RepositoryError>;

    /// Events whose reports state is `pending`, each paired with its active
    /// reports. Events and reports are read as one consistent snapshot.
    async fn list_held_with_reports(
        &self,
    ) -> Result<Vec<(Event, Vec<Report>)>, RepositoryError>;

    /// Ids of active events whose end time is strictly before `now`.
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<EventId>, RepositoryError>;

    /// Events with the given moderation status.
    async fn list_by_status(
        &self,
        status: ModerationStatus,
    ) -> Result<Vec<Event>, RepositoryError>;

    /// Events that are approved and not held by reports.
    async fn list_public(&self) -> Result<Vec<Event>, RepositoryError>;

    /// Every event owned by `owner`, regardless of state.
    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Event>, RepositoryError>;

    /// Every event. Used by the status summary and the CLI.
    async fn get_all(&self) -> Result<Vec<Event>, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn test_error_display() {
        assert_snapshot!(
            RepositoryError::storage("insert", "database is locked").to_string(),
            @"storage error during insert: database is locked"
        );
        assert_snapshot!(
            RepositoryError::corruption("status 'hidden' for event 3").to_string(),
            @"corrupt stored value: status 'hidden' for event 3"
        );
    }
}
