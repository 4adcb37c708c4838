//! Tests for SQLite repository implementation.

use chrono::Duration;
use rusqlite::params;

use super::super::conformance::{self, base_time, report, sample_event};
use super::super::{EventRepository, ReportChange};
use super::{SqliteRepository, CURRENT_SCHEMA_VERSION};
use crate::state_machine::state::{Lifecycle, ModerationStatus, ReportsState, UserId};

#[tokio::test]
async fn test_get_returns_none_for_missing() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let result = repo.get(crate::state_machine::state::EventId(1)).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_insert_get_update_delete() {
    conformance::insert_get_update_delete(&SqliteRepository::new_in_memory().unwrap()).await;
}

#[tokio::test]
async fn test_report_rows_track_count() {
    conformance::report_rows_track_count(&SqliteRepository::new_in_memory().unwrap()).await;
}

#[tokio::test]
async fn test_update_can_clear_reports() {
    conformance::update_can_clear_reports(&SqliteRepository::new_in_memory().unwrap()).await;
}

#[tokio::test]
async fn test_update_keeps_stored_report_count() {
    conformance::update_keeps_stored_report_count(&SqliteRepository::new_in_memory().unwrap())
        .await;
}

/// The CLI and the daemon open the same file with separate connections and
/// separate lock maps. A report recorded through one must survive a state
/// write from the other that started from an older read.
#[tokio::test]
async fn test_update_from_second_connection_keeps_report() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("eventgate-state.db");
    let daemon = SqliteRepository::new(&path).unwrap();
    let cli = SqliteRepository::new(&path).unwrap();

    let id = daemon.insert(&sample_event(1)).await.unwrap();
    let mut snapshot = cli.get(id).await.unwrap().unwrap();
    assert_eq!(snapshot.reports_count, 0);

    daemon.add_report(&report(id, 7)).await.unwrap();

    snapshot.reports_state = ReportsState::Blocked;
    let stored = cli.update(&snapshot, false).await.unwrap().unwrap();
    assert_eq!(stored.reports_count, 1);
    assert_eq!(stored.reports_state, ReportsState::Blocked);

    let reloaded = daemon.get(id).await.unwrap().unwrap();
    assert_eq!(reloaded.reports_count, 1);
    assert_eq!(daemon.reports_for(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_held_events_listed_with_reports() {
    conformance::held_events_listed_with_reports(&SqliteRepository::new_in_memory().unwrap())
        .await;
}

#[tokio::test]
async fn test_queries() {
    conformance::queries(&SqliteRepository::new_in_memory().unwrap()).await;
}

#[tokio::test]
async fn test_text_is_stored_verbatim() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let mut event = sample_event(1);
    event.title = "  Leading and trailing  ".to_string();
    event.description = "Line one\nLine two\t'quoted' \"double\" 한국어".to_string();

    let id = repo.insert(&event).await.unwrap();
    let stored = repo.get(id).await.unwrap().unwrap();

    assert_eq!(stored.title, event.title);
    assert_eq!(stored.description, event.description);
}

#[tokio::test]
async fn test_millisecond_timestamps_round_trip() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let mut event = sample_event(1);
    event.end_at = base_time() + Duration::milliseconds(1_234);

    let id = repo.insert(&event).await.unwrap();
    let stored = repo.get(id).await.unwrap().unwrap();

    assert_eq!(stored.end_at, event.end_at);
}

// =========================================================================
// On-disk persistence tests
// =========================================================================

/// Events and reports persist across database close and reopen.
#[tokio::test]
async fn test_on_disk_persistence_basic() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let id = {
        let repo = SqliteRepository::new(&db_path).unwrap();
        let id = repo.insert(&sample_event(3)).await.unwrap();
        repo.add_report(&report(id, 40)).await.unwrap();
        id
    };

    {
        let repo = SqliteRepository::new(&db_path).unwrap();
        let event = repo.get(id).await.unwrap().expect("event should persist");
        assert_eq!(event.owner, UserId(3));
        assert_eq!(event.reports_count, 1);
        assert_eq!(repo.reports_for(id).await.unwrap(), vec![report(id, 40)]);
    }
}

/// Ids keep increasing after reopen even when the newest row was deleted.
#[tokio::test]
async fn test_ids_not_reused_across_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let first = {
        let repo = SqliteRepository::new(&db_path).unwrap();
        let id = repo.insert(&sample_event(1)).await.unwrap();
        repo.delete(id).await.unwrap();
        id
    };

    let repo = SqliteRepository::new(&db_path).unwrap();
    let second = repo.insert(&sample_event(1)).await.unwrap();
    assert!(second > first);
}

/// Parent directory is created if it doesn't exist.
#[tokio::test]
async fn test_creates_parent_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("nested").join("state").join("test.db");

    assert!(!db_path.parent().unwrap().exists());

    let repo = SqliteRepository::new(&db_path).unwrap();
    repo.insert(&sample_event(1)).await.unwrap();

    assert!(db_path.exists());
}

#[tokio::test]
async fn test_schema_version_persisted() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let _repo = SqliteRepository::new(&db_path).unwrap();
    }

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let version: i64 = conn
        .query_row(
            "SELECT version FROM schema_version WHERE id = 1",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(version, CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_newer_schema_version_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    {
        let _repo = SqliteRepository::new(&db_path).unwrap();
    }
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute(
            "UPDATE schema_version SET version = ?1 WHERE id = 1",
            params![CURRENT_SCHEMA_VERSION + 1],
        )
        .unwrap();
    }

    let err = SqliteRepository::new(&db_path).err().unwrap();
    assert!(err.to_string().contains("newer than supported"));
}

#[tokio::test]
async fn test_wal_mode_enabled() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let _repo = SqliteRepository::new(&db_path).unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(journal_mode.to_lowercase(), "wal");
}

#[cfg(unix)]
#[tokio::test]
async fn test_database_file_has_restrictive_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let _repo = SqliteRepository::new(&db_path).unwrap();

    let mode = std::fs::metadata(&db_path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600, "database file should be 0600, got {:o}", mode);
}

// =========================================================================
// Constraints and corruption
// =========================================================================

#[tokio::test]
async fn test_check_constraints_reject_unknown_enum_values() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let id = repo.insert(&sample_event(1)).await.unwrap();

    let conn = repo.conn.lock().unwrap();
    let result = conn.execute(
        "UPDATE events SET reports_state = 'hidden' WHERE id = ?1",
        params![id.0],
    );
    assert!(result.is_err());
    let result = conn.execute(
        "UPDATE events SET reports_count = -1 WHERE id = ?1",
        params![id.0],
    );
    assert!(result.is_err());
}

/// A row with an undecodable timestamp is an error for `get` and is skipped
/// by listings.
#[tokio::test]
async fn test_corrupt_row_skipped_in_listings() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let good = repo.insert(&sample_event(1)).await.unwrap();
    let bad = repo.insert(&sample_event(1)).await.unwrap();

    {
        let conn = repo.conn.lock().unwrap();
        conn.execute(
            "UPDATE events SET end_at = ?2 WHERE id = ?1",
            params![bad.0, i64::MAX],
        )
        .unwrap();
    }

    assert!(repo.get(bad).await.is_err());

    let listed: Vec<_> = repo
        .list_for_owner(UserId(1))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(listed, vec![good]);
}

#[tokio::test]
async fn test_update_is_full_overwrite() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let id = repo.insert(&sample_event(1)).await.unwrap();
    let mut event = repo.get(id).await.unwrap().unwrap();

    event.title = "Renamed".to_string();
    event.status = ModerationStatus::Spam;
    event.lifecycle = Lifecycle::Inactive;
    event.reports_state = ReportsState::Blocked;
    event.revision = 9;
    assert_eq!(repo.update(&event, false).await.unwrap(), Some(event.clone()));

    assert_eq!(repo.get(id).await.unwrap(), Some(event));
}

#[tokio::test]
async fn test_remove_report_never_goes_below_zero() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let id = repo.insert(&sample_event(1)).await.unwrap();
    repo.add_report(&report(id, 5)).await.unwrap();

    // A zeroed count with a surviving row can only come from outside the
    // repository; the decrement still floors at zero.
    {
        let conn = repo.conn.lock().unwrap();
        conn.execute(
            "UPDATE events SET reports_count = 0 WHERE id = ?1",
            params![id.0],
        )
        .unwrap();
    }

    assert_eq!(
        repo.remove_report(id, UserId(5)).await.unwrap(),
        ReportChange::Applied {
            previous: 0,
            count: 0
        }
    );
}
