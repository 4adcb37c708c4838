//! Input validation for event submissions, edits and reports.
//!
//! Validation happens before any lock is taken or anything is written.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};

use crate::error::ModerationError;
use crate::state_machine::state::Event;

/// Longest accepted report reason, in characters.
pub const MAX_REPORT_REASON_CHARS: usize = 500;

/// A new event as submitted by its organizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl EventDraft {
    pub fn validate(&self) -> Result<(), ModerationError> {
        validate_content(
            &self.title,
            &self.description,
            self.start_at,
            self.end_at,
        )
    }
}

/// A partial edit. Absent or blank fields keep the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

impl EventPatch {
    /// The event with this patch applied, validated as a whole.
    pub fn apply_to(&self, event: &Event) -> Result<Event, ModerationError> {
        let mut next = event.clone();
        if let Some(title) = non_blank(&self.title) {
            next.title = title.to_string();
        }
        if let Some(description) = non_blank(&self.description) {
            next.description = description.to_string();
        }
        if let Some(start_at) = self.start_at {
            next.start_at = start_at;
        }
        if let Some(end_at) = self.end_at {
            next.end_at = end_at;
        }

        validate_content(&next.title, &next.description, next.start_at, next.end_at)?;
        Ok(next)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn validate_content(
    title: &str,
    description: &str,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
) -> Result<(), ModerationError> {
    if title.trim().is_empty() {
        return Err(ModerationError::Validation(
            "title must not be empty".to_string(),
        ));
    }
    if description.trim().is_empty() {
        return Err(ModerationError::Validation(
            "description must not be empty".to_string(),
        ));
    }
    if start_at > end_at {
        return Err(ModerationError::Validation(format!(
            "start {} is after end {}",
            start_at, end_at
        )));
    }
    Ok(())
}

/// Validate a report reason, returning it trimmed.
pub fn validate_reason(reason: &str) -> Result<String, ModerationError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(ModerationError::Validation(
            "report reason must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_REPORT_REASON_CHARS {
        return Err(ModerationError::Validation(format!(
            "report reason must be at most {} characters",
            MAX_REPORT_REASON_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

enum ParsedTime {
    Date(NaiveDate),
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn parse_input(input: &str) -> Result<ParsedTime, ModerationError> {
    let input = input.trim();

    if let Ok(zoned) = DateTime::parse_from_rfc3339(input) {
        return Ok(ParsedTime::Zoned(zoned));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(ParsedTime::Naive(naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(ParsedTime::Date(date));
    }

    Err(ModerationError::Validation(format!(
        "unrecognized date or time '{}'",
        input
    )))
}

fn is_midnight(naive: &NaiveDateTime) -> bool {
    naive.time().num_seconds_from_midnight() == 0 && naive.time().nanosecond() == 0
}

fn end_of_day(date: NaiveDate) -> Result<NaiveDateTime, ModerationError> {
    date.and_hms_opt(23, 59, 59)
        .ok_or_else(|| ModerationError::Validation(format!("invalid date {}", date)))
}

/// Parse a start time. Values without an offset are taken as UTC; a bare
/// date means midnight.
pub fn parse_start_at(input: &str) -> Result<DateTime<Utc>, ModerationError> {
    match parse_input(input)? {
        ParsedTime::Zoned(zoned) => Ok(zoned.with_timezone(&Utc)),
        ParsedTime::Naive(naive) => Ok(naive.and_utc()),
        ParsedTime::Date(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .ok_or_else(|| ModerationError::Validation(format!("invalid date {}", date))),
    }
}

/// Parse an end time.
///
/// Organizers usually enter only the last day of an event. A bare date, or a
/// time of exactly midnight, is moved to 23:59:59 of that day so the event
/// stays active through it.
pub fn parse_end_at(input: &str) -> Result<DateTime<Utc>, ModerationError> {
    match parse_input(input)? {
        ParsedTime::Date(date) => Ok(end_of_day(date)?.and_utc()),
        ParsedTime::Naive(naive) if is_midnight(&naive) => Ok(end_of_day(naive.date())?.and_utc()),
        ParsedTime::Naive(naive) => Ok(naive.and_utc()),
        ParsedTime::Zoned(zoned) if is_midnight(&zoned.naive_local()) => {
            let local_end = end_of_day(zoned.naive_local().date())?;
            zoned
                .offset()
                .from_local_datetime(&local_end)
                .single()
                .map(|end| end.with_timezone(&Utc))
                .ok_or_else(|| {
                    ModerationError::Validation(format!("invalid end time '{}'", input.trim()))
                })
        }
        ParsedTime::Zoned(zoned) => Ok(zoned.with_timezone(&Utc)),
    }
}
