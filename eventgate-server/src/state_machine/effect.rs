//! Effects (side effects as data).
//!
//! Effects describe what should happen as a result of a transition. The
//! transition function stays pure; the store and interpreter carry them out.

/// All effects that can be produced by moderation transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Queue classification of the given content revision.
    Classify {
        revision: u64,
        title: String,
        description: String,
    },

    /// Delete every report row for the event.
    ///
    /// Must be applied in the same repository write as the record that
    /// zeroed `reports_count`.
    ClearReports,

    /// Log a message.
    Log { level: LogLevel, message: String },
}

impl Effect {
    /// Returns true if this effect must be applied together with the record
    /// write rather than after it.
    pub fn is_part_of_write(&self) -> bool {
        matches!(self, Effect::ClearReports)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Effect::Log {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Effect::Log {
            level: LogLevel::Warn,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Effect::Log {
            level: LogLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
