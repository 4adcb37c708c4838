//! Status types for the status endpoint.
//!
//! A moderation summary for operators: how many events sit in each state and
//! which ones are currently held.

use serde::Serialize;

use crate::state_machine::state::{Event, Lifecycle, ModerationStatus, ReportsState};

/// Summary statistics for the status page.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total_events: usize,
    pub pending: usize,
    pub approved: usize,
    pub spam: usize,
    pub active: usize,
    pub inactive: usize,
    pub reports_normal: usize,
    pub reports_pending: usize,
    pub reports_blocked: usize,
}

/// An event under a moderation hold.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct HeldEventEntry {
    pub id: i64,
    pub owner: i64,
    pub title: String,
    pub status: ModerationStatus,
    pub reports_state: ReportsState,
    pub reports_count: u32,
}

/// Full status data for rendering.
#[derive(Debug, Serialize)]
pub struct StatusData {
    pub version: String,
    pub summary: StatusSummary,
    pub held: Vec<HeldEventEntry>,
}

impl StatusData {
    pub fn from_events(events: &[Event], version: String) -> Self {
        let mut summary = StatusSummary {
            total_events: events.len(),
            ..Default::default()
        };
        let mut held = Vec::new();

        for event in events {
            match event.status {
                ModerationStatus::Pending => summary.pending += 1,
                ModerationStatus::Approved => summary.approved += 1,
                ModerationStatus::Spam => summary.spam += 1,
            }
            match event.lifecycle {
                Lifecycle::Active => summary.active += 1,
                Lifecycle::Inactive => summary.inactive += 1,
            }
            match event.reports_state {
                ReportsState::Normal => summary.reports_normal += 1,
                ReportsState::Pending => summary.reports_pending += 1,
                ReportsState::Blocked => summary.reports_blocked += 1,
            }

            if event.is_under_review() {
                held.push(HeldEventEntry {
                    id: event.id.0,
                    owner: event.owner.0,
                    title: event.title.clone(),
                    status: event.status,
                    reports_state: event.reports_state,
                    reports_count: event.reports_count,
                });
            }
        }

        Self {
            version,
            summary,
            held,
        }
    }
}
