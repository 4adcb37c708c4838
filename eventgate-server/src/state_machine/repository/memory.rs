//! In-memory implementation of `EventRepository`.
//!
//! All state is lost on restart. Used by tests and by tools that do not need
//! persistence.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{EventRepository, ReportChange, RepositoryError};
use crate::state_machine::state::{
    Event, EventId, Lifecycle, ModerationStatus, Report, ReportsState, UserId,
};

#[derive(Default)]
struct Tables {
    events: BTreeMap<EventId, Event>,
    /// Keyed by (event, reporter) so each user has at most one report per
    /// event and an event's reports are contiguous.
    reports: BTreeMap<(EventId, UserId), Report>,
    last_id: i64,
}

impl Tables {
    fn clear_reports(&mut self, event_id: EventId) {
        self.reports.retain(|(id, _), _| *id != event_id);
    }

    fn reports_for(&self, event_id: EventId) -> Vec<Report> {
        let mut reports: Vec<Report> = self
            .reports
            .range((event_id, UserId(i64::MIN))..=(event_id, UserId(i64::MAX)))
            .map(|(_, report)| report.clone())
            .collect();
        reports.sort_by_key(|report| (report.created_at, report.user_id));
        reports
    }

    fn select(&self, predicate: impl Fn(&Event) -> bool) -> Vec<Event> {
        self.events
            .values()
            .filter(|event| predicate(event))
            .cloned()
            .collect()
    }
}

/// In-memory event repository.
///
/// Events and reports live behind a single `RwLock` so that report-row
/// changes and count changes are applied together.
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventRepository for InMemoryRepository {
    async fn insert(&self, event: &Event) -> Result<EventId, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.last_id += 1;
        let id = EventId(tables.last_id);

        let mut stored = event.clone();
        stored.id = id;
        tables.events.insert(id, stored);
        Ok(id)
    }

    async fn get(&self, id: EventId) -> Result<Option<Event>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.events.get(&id).cloned())
    }

    async fn update(
        &self,
        event: &Event,
        clear_reports: bool,
    ) -> Result<Option<Event>, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.events.get_mut(&event.id) else {
            return Ok(None);
        };

        let reports_count = if clear_reports {
            0
        } else {
            stored.reports_count
        };
        *stored = Event {
            reports_count,
            ..event.clone()
        };
        let updated = stored.clone();

        if clear_reports {
            tables.clear_reports(event.id);
        }
        Ok(Some(updated))
    }

    async fn delete(&self, id: EventId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        let existed = tables.events.remove(&id).is_some();
        tables.clear_reports(id);
        Ok(existed)
    }

    async fn add_report(&self, report: &Report) -> Result<ReportChange, RepositoryError> {
        let mut tables = self.tables.write().await;
        let key = (report.event_id, report.user_id);
        if !tables.events.contains_key(&report.event_id) {
            return Ok(ReportChange::EventMissing);
        }
        if tables.reports.contains_key(&key) {
            return Ok(ReportChange::Duplicate);
        }

        tables.reports.insert(key, report.clone());
        let Some(event) = tables.events.get_mut(&report.event_id) else {
            return Ok(ReportChange::EventMissing);
        };
        let previous = event.reports_count;
        event.reports_count = previous.saturating_add(1);
        Ok(ReportChange::Applied {
            previous,
            count: event.reports_count,
        })
    }

    async fn remove_report(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<ReportChange, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.events.contains_key(&event_id) {
            return Ok(ReportChange::EventMissing);
        }
        if tables.reports.remove(&(event_id, user_id)).is_none() {
            return Ok(ReportChange::NoSuchReport);
        }

        let Some(event) = tables.events.get_mut(&event_id) else {
            return Ok(ReportChange::EventMissing);
        };
        let previous = event.reports_count;
        event.reports_count = previous.saturating_sub(1);
        Ok(ReportChange::Applied {
            previous,
            count: event.reports_count,
        })
    }

    async fn reports_for(&self, event_id: EventId) -> Result<Vec<Report>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.reports_for(event_id))
    }

    async fn list_held_with_reports(
        &self,
    ) -> Result<Vec<(Event, Vec<Report>)>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .select(|event| event.reports_state == ReportsState::Pending)
            .into_iter()
            .map(|event| {
                let reports = tables.reports_for(event.id);
                (event, reports)
            })
            .collect())
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<EventId>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .values()
            .filter(|event| event.lifecycle == Lifecycle::Active && event.end_at < now)
            .map(|event| event.id)
            .collect())
    }

    async fn list_by_status(
        &self,
        status: ModerationStatus,
    ) -> Result<Vec<Event>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.select(|event| event.status == status))
    }

    async fn list_public(&self) -> Result<Vec<Event>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.select(Event::is_publicly_listable))
    }

    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Event>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.select(|event| event.owner == owner))
    }

    async fn get_all(&self) -> Result<Vec<Event>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.select(|_| true))
    }
}
