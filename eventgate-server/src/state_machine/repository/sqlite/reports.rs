//! Report ledger operations for the SQLite repository.
//!
//! A report row and the owning event's `reports_count` always change in one
//! transaction, so the count equals the number of rows at every commit.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::warn;

use super::super::{ReportChange, RepositoryError};
use super::{from_millis, to_millis, EventRow, SqliteRepository, EVENT_COLUMNS};
use crate::state_machine::state::{Event, EventId, Report, UserId};

/// Current `reports_count` of an event, or None if it does not exist.
fn current_count(
    tx: &Transaction<'_>,
    event_id: EventId,
    operation: &'static str,
) -> Result<Option<u32>, RepositoryError> {
    let count: Option<i64> = tx
        .query_row(
            "SELECT reports_count FROM events WHERE id = ?1",
            params![event_id.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;

    count
        .map(|count| {
            u32::try_from(count).map_err(|_| {
                RepositoryError::corruption(format!(
                    "reports_count '{}' for event {}",
                    count, event_id
                ))
            })
        })
        .transpose()
}

fn set_count(
    tx: &Transaction<'_>,
    event_id: EventId,
    count: u32,
    operation: &'static str,
) -> Result<(), RepositoryError> {
    tx.execute(
        "UPDATE events SET reports_count = ?2 WHERE id = ?1",
        params![event_id.0, count],
    )
    .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;
    Ok(())
}

impl SqliteRepository {
    pub(super) async fn add_report_impl(
        &self,
        report: &Report,
    ) -> Result<ReportChange, RepositoryError> {
        let report = report.clone();

        self.with_conn("add_report", move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("add_report", e.to_string()))?;

            let Some(previous) = current_count(&tx, report.event_id, "add_report")? else {
                return Ok(ReportChange::EventMissing);
            };

            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO reports (event_id, user_id, reason, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        report.event_id.0,
                        report.user_id.0,
                        report.reason,
                        to_millis(report.created_at)
                    ],
                )
                .map_err(|e| RepositoryError::storage("add_report", e.to_string()))?;

            if inserted == 0 {
                return Ok(ReportChange::Duplicate);
            }

            let count = previous.saturating_add(1);
            set_count(&tx, report.event_id, count, "add_report")?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("add_report", e.to_string()))?;
            Ok(ReportChange::Applied { previous, count })
        })
        .await
    }

    pub(super) async fn remove_report_impl(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<ReportChange, RepositoryError> {
        self.with_conn("remove_report", move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("remove_report", e.to_string()))?;

            let Some(previous) = current_count(&tx, event_id, "remove_report")? else {
                return Ok(ReportChange::EventMissing);
            };

            let deleted = tx
                .execute(
                    "DELETE FROM reports WHERE event_id = ?1 AND user_id = ?2",
                    params![event_id.0, user_id.0],
                )
                .map_err(|e| RepositoryError::storage("remove_report", e.to_string()))?;

            if deleted == 0 {
                return Ok(ReportChange::NoSuchReport);
            }

            let count = previous.saturating_sub(1);
            set_count(&tx, event_id, count, "remove_report")?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("remove_report", e.to_string()))?;
            Ok(ReportChange::Applied { previous, count })
        })
        .await
    }

    pub(super) async fn reports_for_impl(
        &self,
        event_id: EventId,
    ) -> Result<Vec<Report>, RepositoryError> {
        self.with_conn("reports_for", move |conn| {
            read_reports(conn, event_id, "reports_for")
        })
        .await
    }

    pub(super) async fn list_held_with_reports_impl(
        &self,
    ) -> Result<Vec<(Event, Vec<Report>)>, RepositoryError> {
        const OPERATION: &str = "list_held_with_reports";

        self.with_conn(OPERATION, move |conn| {
            // Events and report rows are read in one transaction, so both
            // come from the same snapshot.
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage(OPERATION, e.to_string()))?;

            let mut events = Vec::new();
            {
                let mut stmt = tx
                    .prepare(&format!(
                        "SELECT {} FROM events WHERE reports_state = 'pending' ORDER BY id",
                        EVENT_COLUMNS
                    ))
                    .map_err(|e| RepositoryError::storage(OPERATION, e.to_string()))?;
                let rows = stmt
                    .query_map([], EventRow::read)
                    .map_err(|e| RepositoryError::storage(OPERATION, e.to_string()))?;

                for row in rows {
                    let row = row.map_err(|e| RepositoryError::storage(OPERATION, e.to_string()))?;
                    let id = row.id;
                    match row.into_event() {
                        Ok(event) => events.push(event),
                        Err(e) => warn!("Skipping corrupt event {} in {}: {}", id, OPERATION, e),
                    }
                }
            }

            let mut held = Vec::with_capacity(events.len());
            for event in events {
                let reports = read_reports(&tx, event.id, OPERATION)?;
                held.push((event, reports));
            }

            tx.commit()
                .map_err(|e| RepositoryError::storage(OPERATION, e.to_string()))?;
            Ok(held)
        })
        .await
    }
}

/// Report rows for one event, oldest first.
fn read_reports(
    conn: &Connection,
    event_id: EventId,
    operation: &'static str,
) -> Result<Vec<Report>, RepositoryError> {
    let mut stmt = conn
        .prepare(
            "SELECT user_id, reason, created_at FROM reports
             WHERE event_id = ?1
             ORDER BY created_at, user_id",
        )
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;

    let rows = stmt
        .query_map(params![event_id.0], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;

    let mut reports = Vec::new();
    for row in rows {
        let (user_id, reason, created_at) =
            row.map_err(|e| RepositoryError::storage(operation, e.to_string()))?;
        reports.push(Report {
            event_id,
            user_id: UserId(user_id),
            reason,
            created_at: from_millis(created_at, "report created_at")?,
        });
    }
    Ok(reports)
}
