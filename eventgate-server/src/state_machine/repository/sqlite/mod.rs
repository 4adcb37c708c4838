//! SQLite implementation of `EventRepository`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Storage format
//!
//! Timestamps are stored as unix milliseconds. Enum fields are stored as
//! their lowercase names and constrained by `CHECK` clauses.

mod reports;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior,
};
use tracing::{error, warn};

use super::{EventRepository, ReportChange, RepositoryError};
use crate::state_machine::state::{Event, EventId, ModerationStatus, Report, UserId};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Column list matching `EventRow::read`.
const EVENT_COLUMNS: &str = "id, owner_id, title, description, start_at, end_at, status, \
     lifecycle, reports_count, reports_state, revision, created_at, updated_at";

/// SQLite-backed event repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    /// Exposed as `pub(crate)` so tests can write rows the repository never
    /// would.
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Create a new SQLite repository at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    /// Runs any pending migrations if the database exists but has an older schema.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` so a committed report or verdict survives power loss
    /// - `busy_timeout = 5000ms` so the CLI and the daemon can share the file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // Reports carry user ids; keep the file private to the service user.
        #[cfg(unix)]
        if !is_in_memory && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        // SQLite can silently keep DELETE mode on filesystems without shared
        // memory support. In-memory databases report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'. \
                     Place the state directory on a local filesystem.",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // 0 if the table is empty (fresh database)
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    start_at INTEGER NOT NULL,
                    end_at INTEGER NOT NULL,
                    status TEXT NOT NULL
                        CHECK (status IN ('pending', 'approved', 'spam')),
                    lifecycle TEXT NOT NULL
                        CHECK (lifecycle IN ('active', 'inactive')),
                    reports_count INTEGER NOT NULL DEFAULT 0
                        CHECK (reports_count >= 0),
                    reports_state TEXT NOT NULL DEFAULT 'normal'
                        CHECK (reports_state IN ('normal', 'pending', 'blocked')),
                    revision INTEGER NOT NULL DEFAULT 1,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_events_owner ON events(owner_id);
                CREATE INDEX IF NOT EXISTS idx_events_expiry
                    ON events(end_at) WHERE lifecycle = 'active';
                CREATE INDEX IF NOT EXISTS idx_events_reports_state
                    ON events(reports_state) WHERE reports_state != 'normal';

                CREATE TABLE IF NOT EXISTS reports (
                    event_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    reason TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    PRIMARY KEY (event_id, user_id)
                );
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking pool.
    pub(super) async fn with_conn<T, F>(
        &self,
        operation: &'static str,
        f: F,
    ) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }

    /// Run a `SELECT` over the events table and decode every row.
    ///
    /// Rows that fail to decode are skipped and logged so that one corrupt
    /// record does not hide every other event from listings.
    async fn select_events(
        &self,
        operation: &'static str,
        where_clause: &'static str,
        args: Vec<Value>,
    ) -> Result<Vec<Event>, RepositoryError> {
        self.with_conn(operation, move |conn| {
            let sql = format!(
                "SELECT {} FROM events {} ORDER BY id",
                EVENT_COLUMNS, where_clause
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;
            let rows = stmt
                .query_map(params_from_iter(args), EventRow::read)
                .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;

            let mut events = Vec::new();
            for row in rows {
                let row = match row {
                    Ok(row) => row,
                    Err(e) => {
                        error!("Failed to read event row from SQLite: {}", e);
                        continue;
                    }
                };
                let id = row.id;
                match row.into_event() {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        warn!(
                            "Skipping corrupt event {} in {}: {}. \
                             This row needs manual investigation.",
                            id, operation, e
                        );
                    }
                }
            }
            Ok(events)
        })
        .await
    }
}

// =============================================================================
// Row conversion
// =============================================================================

pub(super) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(super) fn from_millis(value: i64, what: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_millis(value)
        .ok_or_else(|| RepositoryError::corruption(format!("{} timestamp {}", what, value)))
}

fn revision_to_i64(revision: u64) -> Result<i64, RepositoryError> {
    i64::try_from(revision).map_err(|_| {
        RepositoryError::storage(
            "encode revision",
            format!("revision {} exceeds maximum storable value", revision),
        )
    })
}

/// An events row as stored, before decoding.
struct EventRow {
    id: i64,
    owner_id: i64,
    title: String,
    description: String,
    start_at: i64,
    end_at: i64,
    status: String,
    lifecycle: String,
    reports_count: i64,
    reports_state: String,
    revision: i64,
    created_at: i64,
    updated_at: i64,
}

impl EventRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            start_at: row.get(4)?,
            end_at: row.get(5)?,
            status: row.get(6)?,
            lifecycle: row.get(7)?,
            reports_count: row.get(8)?,
            reports_state: row.get(9)?,
            revision: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_event(self) -> Result<Event, RepositoryError> {
        let corrupt = |field: &str, value: &dyn std::fmt::Display| {
            RepositoryError::corruption(format!("{} '{}' for event {}", field, value, self.id))
        };

        Ok(Event {
            id: EventId(self.id),
            owner: UserId(self.owner_id),
            start_at: from_millis(self.start_at, "start_at")?,
            end_at: from_millis(self.end_at, "end_at")?,
            status: self
                .status
                .parse()
                .map_err(|_| corrupt("status", &self.status))?,
            lifecycle: self
                .lifecycle
                .parse()
                .map_err(|_| corrupt("lifecycle", &self.lifecycle))?,
            reports_count: u32::try_from(self.reports_count)
                .map_err(|_| corrupt("reports_count", &self.reports_count))?,
            reports_state: self
                .reports_state
                .parse()
                .map_err(|_| corrupt("reports_state", &self.reports_state))?,
            revision: u64::try_from(self.revision)
                .map_err(|_| corrupt("revision", &self.revision))?,
            created_at: from_millis(self.created_at, "created_at")?,
            updated_at: from_millis(self.updated_at, "updated_at")?,
            title: self.title,
            description: self.description,
        })
    }
}

// =============================================================================
// EventRepository trait implementation
// =============================================================================

#[async_trait]
impl EventRepository for SqliteRepository {
    async fn insert(&self, event: &Event) -> Result<EventId, RepositoryError> {
        let event = event.clone();
        let revision = revision_to_i64(event.revision)?;

        self.with_conn("insert", move |conn| {
            conn.execute(
                "INSERT INTO events (owner_id, title, description, start_at, end_at, status,
                                     lifecycle, reports_count, reports_state, revision,
                                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    event.owner.0,
                    event.title,
                    event.description,
                    to_millis(event.start_at),
                    to_millis(event.end_at),
                    event.status.as_str(),
                    event.lifecycle.as_str(),
                    event.reports_count,
                    event.reports_state.as_str(),
                    revision,
                    to_millis(event.created_at),
                    to_millis(event.updated_at),
                ],
            )
            .map_err(|e| RepositoryError::storage("insert", e.to_string()))?;

            Ok(EventId(conn.last_insert_rowid()))
        })
        .await
    }

    async fn get(&self, id: EventId) -> Result<Option<Event>, RepositoryError> {
        self.with_conn("get", move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
                    params![id.0],
                    EventRow::read,
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get", e.to_string()))?;

            row.map(EventRow::into_event).transpose()
        })
        .await
    }

    async fn update(
        &self,
        event: &Event,
        clear_reports: bool,
    ) -> Result<Option<Event>, RepositoryError> {
        let event = event.clone();
        let revision = revision_to_i64(event.revision)?;

        self.with_conn("update", move |conn| {
            // IMMEDIATE takes the write lock up front, so a report added by
            // another process cannot land between the UPDATE and the re-read.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("update", e.to_string()))?;

            // reports_count belongs to the report rows, not to the caller's
            // snapshot: it is only ever reset here, never overwritten.
            let changed = tx
                .execute(
                    "UPDATE events SET
                         owner_id = ?2, title = ?3, description = ?4, start_at = ?5,
                         end_at = ?6, status = ?7, lifecycle = ?8,
                         reports_count = CASE WHEN ?9 THEN 0 ELSE reports_count END,
                         reports_state = ?10, revision = ?11, created_at = ?12,
                         updated_at = ?13
                     WHERE id = ?1",
                    params![
                        event.id.0,
                        event.owner.0,
                        event.title,
                        event.description,
                        to_millis(event.start_at),
                        to_millis(event.end_at),
                        event.status.as_str(),
                        event.lifecycle.as_str(),
                        clear_reports,
                        event.reports_state.as_str(),
                        revision,
                        to_millis(event.created_at),
                        to_millis(event.updated_at),
                    ],
                )
                .map_err(|e| RepositoryError::storage("update", e.to_string()))?;

            if changed == 0 {
                return Ok(None);
            }

            if clear_reports {
                tx.execute(
                    "DELETE FROM reports WHERE event_id = ?1",
                    params![event.id.0],
                )
                .map_err(|e| RepositoryError::storage("clear reports", e.to_string()))?;
            }

            let stored = tx
                .query_row(
                    &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
                    params![event.id.0],
                    EventRow::read,
                )
                .map_err(|e| RepositoryError::storage("update", e.to_string()))?
                .into_event()?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("update", e.to_string()))?;
            Ok(Some(stored))
        })
        .await
    }

    async fn delete(&self, id: EventId) -> Result<bool, RepositoryError> {
        self.with_conn("delete", move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("delete", e.to_string()))?;

            tx.execute("DELETE FROM reports WHERE event_id = ?1", params![id.0])
                .map_err(|e| RepositoryError::storage("delete reports", e.to_string()))?;
            let deleted = tx
                .execute("DELETE FROM events WHERE id = ?1", params![id.0])
                .map_err(|e| RepositoryError::storage("delete", e.to_string()))?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("delete", e.to_string()))?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn add_report(&self, report: &Report) -> Result<ReportChange, RepositoryError> {
        self.add_report_impl(report).await
    }

    async fn remove_report(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<ReportChange, RepositoryError> {
        self.remove_report_impl(event_id, user_id).await
    }

    async fn reports_for(&self, event_id: EventId) -> Result<Vec<Report>, RepositoryError> {
        self.reports_for_impl(event_id).await
    }

    async fn list_held_with_reports(
        &self,
    ) -> Result<Vec<(Event, Vec<Report>)>, RepositoryError> {
        self.list_held_with_reports_impl().await
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<EventId>, RepositoryError> {
        let now_ms = to_millis(now);

        self.with_conn("find_expired", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id FROM events
                     WHERE lifecycle = 'active' AND end_at < ?1
                     ORDER BY id",
                )
                .map_err(|e| RepositoryError::storage("find_expired", e.to_string()))?;

            let ids = stmt
                .query_map(params![now_ms], |row| row.get::<_, i64>(0))
                .map_err(|e| RepositoryError::storage("find_expired", e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RepositoryError::storage("find_expired", e.to_string()))?;

            Ok(ids.into_iter().map(EventId).collect())
        })
        .await
    }

    async fn list_by_status(
        &self,
        status: ModerationStatus,
    ) -> Result<Vec<Event>, RepositoryError> {
        self.select_events(
            "list_by_status",
            "WHERE status = ?1",
            vec![Value::from(status.as_str().to_string())],
        )
        .await
    }

    async fn list_public(&self) -> Result<Vec<Event>, RepositoryError> {
        self.select_events(
            "list_public",
            "WHERE status = 'approved' AND reports_state = 'normal'",
            vec![],
        )
        .await
    }

    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Event>, RepositoryError> {
        self.select_events(
            "list_for_owner",
            "WHERE owner_id = ?1",
            vec![Value::from(owner.0)],
        )
        .await
    }

    async fn get_all(&self) -> Result<Vec<Event>, RepositoryError> {
        self.select_events("get_all", "", vec![]).await
    }
}
