//! Report ledger.
//!
//! A user has at most one active report per event. The report row and the
//! event's `reports_count` change together in one repository operation, and
//! the new count is then fed to the state machine.

use tracing::info;

use crate::error::ModerationError;
use crate::state_machine::event::ModerationEvent;
use crate::state_machine::repository::ReportChange;
use crate::state_machine::state::{Event, EventId, Report, UserId};
use crate::state_machine::store::ModerationStore;
use crate::validation::validate_reason;

impl ModerationStore {
    /// Report an event on behalf of `user_id`.
    pub async fn submit_report(
        &self,
        event_id: EventId,
        user_id: UserId,
        reason: &str,
    ) -> Result<Event, ModerationError> {
        let reason = validate_reason(reason)?;

        let result = async {
            let _guard = self.lock_event(event_id).await;
            let report = Report {
                event_id,
                user_id,
                reason,
                created_at: self.now(),
            };

            let change = self.repository().add_report(&report).await?;
            let (previous, count) = applied(event_id, change)?;
            info!(
                "User {} reported event {} ({} -> {} reports)",
                user_id, event_id, previous, count
            );

            let current = self.load(event_id).await?;
            self.process(current, ModerationEvent::ReportCountChanged { previous, count })
                .await
        }
        .await;
        self.release_if_missing(event_id, result).await
    }

    /// Withdraw `user_id`'s report against an event.
    pub async fn withdraw_report(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Event, ModerationError> {
        let result = async {
            let _guard = self.lock_event(event_id).await;

            let change = self
                .repository()
                .remove_report(event_id, user_id)
                .await?;
            let (previous, count) = applied(event_id, change)?;
            info!(
                "User {} withdrew report on event {} ({} -> {} reports)",
                user_id, event_id, previous, count
            );

            let current = self.load(event_id).await?;
            self.process(current, ModerationEvent::ReportCountChanged { previous, count })
                .await
        }
        .await;
        self.release_if_missing(event_id, result).await
    }
}

fn applied(event_id: EventId, change: ReportChange) -> Result<(u32, u32), ModerationError> {
    match change {
        ReportChange::Applied { previous, count } => Ok((previous, count)),
        ReportChange::Duplicate => Err(ModerationError::AlreadyReported),
        ReportChange::NoSuchReport => Err(ModerationError::NoSuchReport),
        ReportChange::EventMissing => Err(ModerationError::NotFound(event_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::state::ReportsState;
    use crate::state_machine::store::tests::Harness;
    use proptest::prelude::*;

    async fn report(h: &Harness, event: EventId, user: i64) -> Result<Event, ModerationError> {
        h.store
            .submit_report(event, UserId(user), "misleading listing")
            .await
    }

    /// Scenario: three reports keep the event listed, a fourth holds it, and
    /// one withdrawal releases it with all reports cleared.
    #[tokio::test]
    async fn test_threshold_scenario() {
        let h = Harness::new();
        let event = h.create_approved(1).await;

        for user in 10..13 {
            let after = report(&h, event.id, user).await.unwrap();
            assert_eq!(after.reports_state, ReportsState::Normal);
        }

        let held = report(&h, event.id, 13).await.unwrap();
        assert_eq!(held.reports_state, ReportsState::Pending);
        assert_eq!(held.reports_count, 4);
        let pending = h.store.list_pending_moderation().await.unwrap();
        assert_eq!(pending.len(), 1);
        let (listed, reports) = &pending[0];
        assert_eq!(listed.reports_count as usize, reports.len());
        assert_eq!(
            reports.iter().map(|r| r.user_id).collect::<Vec<_>>(),
            vec![UserId(10), UserId(11), UserId(12), UserId(13)]
        );
        assert!(h.store.list_public().await.unwrap().is_empty());

        let released = h
            .store
            .withdraw_report(event.id, UserId(13))
            .await
            .unwrap();
        assert_eq!(released.reports_state, ReportsState::Normal);
        assert_eq!(released.reports_count, 0);
        assert!(h
            .store
            .repository()
            .reports_for(event.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_report_rejected() {
        let h = Harness::new();
        let event = h.create_approved(1).await;

        report(&h, event.id, 5).await.unwrap();
        assert_eq!(
            report(&h, event.id, 5).await,
            Err(ModerationError::AlreadyReported)
        );
        assert_eq!(h.store.get_event(event.id).await.unwrap().reports_count, 1);
    }

    #[tokio::test]
    async fn test_withdraw_without_report() {
        let h = Harness::new();
        let event = h.create_approved(1).await;

        assert_eq!(
            h.store.withdraw_report(event.id, UserId(5)).await,
            Err(ModerationError::NoSuchReport)
        );
    }

    #[tokio::test]
    async fn test_report_missing_event() {
        let h = Harness::new();
        assert_eq!(
            report(&h, EventId(77), 5).await,
            Err(ModerationError::NotFound(EventId(77)))
        );
        assert_eq!(
            h.store.withdraw_report(EventId(78), UserId(5)).await,
            Err(ModerationError::NotFound(EventId(78)))
        );
        assert_eq!(h.store.lock_entries().await, 0);
    }

    #[tokio::test]
    async fn test_reason_validated_before_write() {
        let h = Harness::new();
        let event = h.create_approved(1).await;

        let result = h.store.submit_report(event.id, UserId(5), "   ").await;
        assert!(matches!(result, Err(ModerationError::Validation(_))));
        assert_eq!(h.store.get_event(event.id).await.unwrap().reports_count, 0);
    }

    #[tokio::test]
    async fn test_reason_stored_trimmed() {
        let h = Harness::new();
        let event = h.create_approved(1).await;

        h.store
            .submit_report(event.id, UserId(5), "  wrong venue \n")
            .await
            .unwrap();
        let reports = h.store.repository().reports_for(event.id).await.unwrap();
        assert_eq!(reports[0].reason, "wrong venue");
    }

    /// Scenario: an administrator blocks at one report; withdrawing it leaves
    /// the event blocked.
    #[tokio::test]
    async fn test_blocked_survives_withdrawal() {
        let h = Harness::new();
        let event = h.create_approved(1).await;

        report(&h, event.id, 5).await.unwrap();
        h.store
            .admin_set_reports_state(event.id, ReportsState::Blocked)
            .await
            .unwrap();

        let after = h.store.withdraw_report(event.id, UserId(5)).await.unwrap();
        assert_eq!(after.reports_count, 0);
        assert_eq!(after.reports_state, ReportsState::Blocked);
    }

    #[tokio::test]
    async fn test_concurrent_reports_are_all_counted() {
        let h = Harness::new();
        let event = h.create_approved(1).await;

        let mut tasks = Vec::new();
        for user in 0..3 {
            let store = h.store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .submit_report(event.id, UserId(100 + user), "duplicate listing")
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = h.store.get_event(event.id).await.unwrap();
        assert_eq!(stored.reports_count, 3);
        assert_eq!(stored.reports_state, ReportsState::Normal);
    }

    proptest! {
        /// `reports_count` matches the number of report rows after any
        /// sequence of submissions and withdrawals.
        #[test]
        fn prop_count_matches_rows(ops in prop::collection::vec((any::<bool>(), 0i64..6), 0..40)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async {
                let h = Harness::new();
                let event = h.create_approved(1).await;

                for (submit, user) in ops {
                    let result = if submit {
                        h.store.submit_report(event.id, UserId(user), "spam").await
                    } else {
                        h.store.withdraw_report(event.id, UserId(user)).await
                    };
                    if let Err(e) = &result {
                        prop_assert!(matches!(
                            e,
                            ModerationError::AlreadyReported | ModerationError::NoSuchReport
                        ));
                    }

                    let stored = h.store.get_event(event.id).await.unwrap();
                    let rows = h.store.repository().reports_for(event.id).await.unwrap();
                    prop_assert_eq!(stored.reports_count as usize, rows.len());
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
