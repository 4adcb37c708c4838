//! Behavior shared by every `EventRepository` implementation.
//!
//! Each backend's test module calls these with a fresh repository.

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{EventRepository, ReportChange};
use crate::state_machine::state::{
    Event, EventId, Lifecycle, ModerationStatus, Report, ReportsState, UserId,
};

/// Whole seconds so that every backend round-trips the value exactly.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
}

pub fn sample_event(owner: i64) -> Event {
    let now = base_time();
    Event {
        id: EventId::UNASSIGNED,
        owner: UserId(owner),
        title: "Night market".to_string(),
        description: "Food stalls and live music".to_string(),
        start_at: now,
        end_at: now + Duration::hours(4),
        status: ModerationStatus::Pending,
        lifecycle: Lifecycle::Active,
        reports_count: 0,
        reports_state: ReportsState::Normal,
        revision: 1,
        created_at: now,
        updated_at: now,
    }
}

pub fn report(event_id: EventId, user: i64) -> Report {
    Report {
        event_id,
        user_id: UserId(user),
        reason: format!("report from {}", user),
        created_at: base_time() + Duration::seconds(user),
    }
}

pub async fn insert_get_update_delete(repo: &dyn EventRepository) {
    let id = repo.insert(&sample_event(1)).await.unwrap();
    assert_ne!(id, EventId::UNASSIGNED);

    let mut stored = repo.get(id).await.unwrap().unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.title, "Night market");
    assert_eq!(stored.end_at, base_time() + Duration::hours(4));

    stored.status = ModerationStatus::Approved;
    stored.revision = 2;
    stored.updated_at = base_time() + Duration::minutes(5);
    assert_eq!(repo.update(&stored, false).await.unwrap(), Some(stored.clone()));
    assert_eq!(repo.get(id).await.unwrap(), Some(stored.clone()));

    assert!(repo.delete(id).await.unwrap());
    assert_eq!(repo.get(id).await.unwrap(), None);
    assert!(!repo.delete(id).await.unwrap());

    // Updating a deleted event must not bring it back.
    assert_eq!(repo.update(&stored, false).await.unwrap(), None);
    assert_eq!(repo.get(id).await.unwrap(), None);
}

pub async fn report_rows_track_count(repo: &dyn EventRepository) {
    let id = repo.insert(&sample_event(1)).await.unwrap();

    assert_eq!(
        repo.add_report(&report(id, 10)).await.unwrap(),
        ReportChange::Applied {
            previous: 0,
            count: 1
        }
    );
    assert_eq!(
        repo.add_report(&report(id, 11)).await.unwrap(),
        ReportChange::Applied {
            previous: 1,
            count: 2
        }
    );
    assert_eq!(
        repo.add_report(&report(id, 10)).await.unwrap(),
        ReportChange::Duplicate
    );
    assert_eq!(repo.get(id).await.unwrap().unwrap().reports_count, 2);

    let reports = repo.reports_for(id).await.unwrap();
    assert_eq!(reports, vec![report(id, 10), report(id, 11)]);

    assert_eq!(
        repo.remove_report(id, UserId(10)).await.unwrap(),
        ReportChange::Applied {
            previous: 2,
            count: 1
        }
    );
    assert_eq!(
        repo.remove_report(id, UserId(10)).await.unwrap(),
        ReportChange::NoSuchReport
    );
    assert_eq!(repo.get(id).await.unwrap().unwrap().reports_count, 1);

    let missing = EventId(id.0 + 1000);
    assert_eq!(
        repo.add_report(&report(missing, 10)).await.unwrap(),
        ReportChange::EventMissing
    );
    assert_eq!(
        repo.remove_report(missing, UserId(10)).await.unwrap(),
        ReportChange::EventMissing
    );

    assert!(repo.delete(id).await.unwrap());
    assert!(repo.reports_for(id).await.unwrap().is_empty());
}

pub async fn update_can_clear_reports(repo: &dyn EventRepository) {
    let id = repo.insert(&sample_event(1)).await.unwrap();
    for user in 20..25 {
        repo.add_report(&report(id, user)).await.unwrap();
    }

    let mut event = repo.get(id).await.unwrap().unwrap();
    assert_eq!(event.reports_count, 5);

    event.reports_count = 0;
    event.reports_state = ReportsState::Normal;
    assert_eq!(repo.update(&event, true).await.unwrap(), Some(event.clone()));

    assert!(repo.reports_for(id).await.unwrap().is_empty());
    assert_eq!(repo.get(id).await.unwrap().unwrap().reports_count, 0);

    // Same user can report again once cleared.
    assert_eq!(
        repo.add_report(&report(id, 20)).await.unwrap(),
        ReportChange::Applied {
            previous: 0,
            count: 1
        }
    );
}

/// `update` keeps the stored count even when handed an older snapshot, so a
/// report recorded after the snapshot was read is not lost.
pub async fn update_keeps_stored_report_count(repo: &dyn EventRepository) {
    let id = repo.insert(&sample_event(1)).await.unwrap();
    let mut snapshot = repo.get(id).await.unwrap().unwrap();

    repo.add_report(&report(id, 30)).await.unwrap();
    repo.add_report(&report(id, 31)).await.unwrap();

    snapshot.status = ModerationStatus::Approved;
    let stored = repo.update(&snapshot, false).await.unwrap().unwrap();
    assert_eq!(stored.status, ModerationStatus::Approved);
    assert_eq!(stored.reports_count, 2);

    let reloaded = repo.get(id).await.unwrap().unwrap();
    assert_eq!(reloaded, stored);
    assert_eq!(
        reloaded.reports_count as usize,
        repo.reports_for(id).await.unwrap().len()
    );

    // A count in the record passed in is ignored without `clear_reports`.
    snapshot.reports_count = 9;
    let stored = repo.update(&snapshot, false).await.unwrap().unwrap();
    assert_eq!(stored.reports_count, 2);
}

pub async fn held_events_listed_with_reports(repo: &dyn EventRepository) {
    assert!(repo.list_held_with_reports().await.unwrap().is_empty());

    let mut held = sample_event(1);
    held.reports_state = ReportsState::Pending;
    let held = repo.insert(&held).await.unwrap();
    let quiet_held = {
        let mut event = sample_event(2);
        event.reports_state = ReportsState::Pending;
        repo.insert(&event).await.unwrap()
    };
    let normal = repo.insert(&sample_event(3)).await.unwrap();

    // Inserted newest-first; listed oldest-first.
    for user in [42, 41, 40] {
        repo.add_report(&report(held, user)).await.unwrap();
    }
    repo.add_report(&report(normal, 40)).await.unwrap();

    let listed = repo.list_held_with_reports().await.unwrap();
    let shape: Vec<(EventId, u32, Vec<UserId>)> = listed
        .iter()
        .map(|(event, reports)| {
            (
                event.id,
                event.reports_count,
                reports.iter().map(|r| r.user_id).collect(),
            )
        })
        .collect();
    assert_eq!(
        shape,
        vec![
            (held, 3, vec![UserId(40), UserId(41), UserId(42)]),
            (quiet_held, 0, vec![]),
        ]
    );
}

pub async fn queries(repo: &dyn EventRepository) {
    let now = base_time() + Duration::hours(10);

    let mut public = sample_event(1);
    public.status = ModerationStatus::Approved;
    let public = repo.insert(&public).await.unwrap();

    let mut held = sample_event(1);
    held.status = ModerationStatus::Approved;
    held.reports_state = ReportsState::Pending;
    held.end_at = now + Duration::days(1);
    let held = repo.insert(&held).await.unwrap();

    let mut spam = sample_event(2);
    spam.status = ModerationStatus::Spam;
    spam.lifecycle = Lifecycle::Inactive;
    let spam = repo.insert(&spam).await.unwrap();

    let ids = |events: Vec<Event>| events.into_iter().map(|e| e.id).collect::<Vec<_>>();

    assert_eq!(ids(repo.list_public().await.unwrap()), vec![public]);
    assert_eq!(
        ids(repo.list_for_owner(UserId(1)).await.unwrap()),
        vec![public, held]
    );
    let listed_held: Vec<EventId> = repo
        .list_held_with_reports()
        .await
        .unwrap()
        .into_iter()
        .map(|(event, _)| event.id)
        .collect();
    assert_eq!(listed_held, vec![held]);
    assert_eq!(
        ids(repo.list_by_status(ModerationStatus::Spam).await.unwrap()),
        vec![spam]
    );
    assert_eq!(repo.get_all().await.unwrap().len(), 3);

    // `spam` already ended but is inactive; `held` ends tomorrow.
    assert_eq!(repo.find_expired(now).await.unwrap(), vec![public]);

    // Strictly before: an event ending exactly now is not a candidate.
    let at_end = base_time() + Duration::hours(4);
    assert!(repo.find_expired(at_end).await.unwrap().is_empty());
}
