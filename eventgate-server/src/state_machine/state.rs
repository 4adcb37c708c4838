//! State types for event moderation.
//!
//! An event's visibility is decided by three independent fields: the
//! classifier-driven `status`, the time-driven `lifecycle`, and the
//! community-driven `reports_state`. They are plain enums so that every
//! combination stays representable and each is transitioned separately.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of active reports at which an event is held for review.
pub const REPORT_THRESHOLD: u32 = 4;

/// Newtype for event identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl EventId {
    /// Placeholder carried by an event that has not been stored yet.
    pub const UNASSIGNED: EventId = EventId(0);
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Newtype for user identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Error returned when parsing one of the moderation enums from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Implements `as_str`, `Display` and `FromStr` over the lowercase names used
/// in storage and on the command line.
macro_rules! text_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Classifier-driven moderation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    /// Awaiting a classifier verdict for the current revision.
    Pending,
    Approved,
    Spam,
}

text_enum!(ModerationStatus, "status", {
    Pending => "pending",
    Approved => "approved",
    Spam => "spam",
});

/// Whether the event's scheduled window is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Active,
    Inactive,
}

text_enum!(Lifecycle, "lifecycle", {
    Active => "active",
    Inactive => "inactive",
});

impl Lifecycle {
    /// Lifecycle implied by an end time at the given instant.
    pub fn at(end_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if end_at > now {
            Lifecycle::Active
        } else {
            Lifecycle::Inactive
        }
    }
}

/// Community-moderation gate driven by reports and administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportsState {
    Normal,
    /// Report threshold reached; held for administrator review.
    Pending,
    /// Blocked by an administrator. Only an administrator can clear it.
    Blocked,
}

text_enum!(ReportsState, "reports state", {
    Normal => "normal",
    Pending => "pending",
    Blocked => "blocked",
});

/// An event listing together with its moderation and lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub owner: UserId,
    pub title: String,
    pub description: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: ModerationStatus,
    pub lifecycle: Lifecycle,
    pub reports_count: u32,
    pub reports_state: ReportsState,
    /// Content revision. Bumped by every edit and every reclassify request;
    /// classifier verdicts for an older revision are discarded.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Whether the event may appear in public listings.
    ///
    /// Lifecycle does not gate listing: past events stay listed.
    pub fn is_publicly_listable(&self) -> bool {
        self.status == ModerationStatus::Approved && self.reports_state == ReportsState::Normal
    }

    /// Whether the event is currently under any moderation hold.
    pub fn is_under_review(&self) -> bool {
        self.status == ModerationStatus::Pending
            || matches!(
                self.reports_state,
                ReportsState::Pending | ReportsState::Blocked
            )
    }
}

/// A single user's report against an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub event_id: EventId,
    pub user_id: UserId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
