//! Inputs to the moderation state machine.
//!
//! Each variant is something that happened to an event: a request from a
//! user or administrator, a classifier result, a ledger change, or the
//! passage of time. They are inputs to the pure transition function.

use super::state::ReportsState;

/// All inputs that can trigger moderation transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationEvent {
    // =========================================================================
    // Content
    // =========================================================================
    /// A new event was submitted. The record carries the submitted content.
    Created,

    /// The event's content was edited. The record already carries the new
    /// content; moderation must start over.
    Edited,

    /// An administrator asked for the current content to be classified again.
    ReclassifyRequested,

    // =========================================================================
    // Classifier results
    // =========================================================================
    /// Classification of `revision` finished with a verdict.
    ClassificationFinished { revision: u64, is_spam: bool },

    /// Classification of `revision` failed after all retries.
    ClassificationFailed { revision: u64, error: String },

    // =========================================================================
    // Community moderation
    // =========================================================================
    /// The ledger changed the number of active reports from `previous` to
    /// `count`.
    ReportCountChanged { previous: u32, count: u32 },

    /// An administrator set the reports state directly.
    AdminSetReportsState { state: ReportsState },

    // =========================================================================
    // Time
    // =========================================================================
    /// The expiry sweep selected this event as possibly past its end time.
    Expired,
}

impl ModerationEvent {
    /// Short description for logging, without payload text.
    pub fn log_summary(&self) -> String {
        match self {
            Self::Created => "Created".to_string(),
            Self::Edited => "Edited".to_string(),
            Self::ReclassifyRequested => "ReclassifyRequested".to_string(),
            Self::ClassificationFinished { revision, is_spam } => format!(
                "ClassificationFinished(rev={}, spam={})",
                revision, is_spam
            ),
            Self::ClassificationFailed { revision, .. } => {
                format!("ClassificationFailed(rev={})", revision)
            }
            Self::ReportCountChanged { previous, count } => {
                format!("ReportCountChanged({} -> {})", previous, count)
            }
            Self::AdminSetReportsState { state } => format!("AdminSetReportsState({})", state),
            Self::Expired => "Expired".to_string(),
        }
    }
}
