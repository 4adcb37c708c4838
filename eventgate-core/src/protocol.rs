//! Wire protocol spoken by the external classifier process.
//!
//! The classifier reads the text to score on stdin and answers with exactly one
//! JSON line on stdout, either `{"result": 0|1}` or `{"error": "<message>"}`.
//! Stderr carries diagnostics, one per line, as JSON
//! (`{"info"|"warning"|"error": "<message>"}`) or plain text.

use serde::Deserialize;

use crate::error::ClassifierError;

/// Maximum number of stderr bytes kept in an exit-status error.
const STDERR_TAIL_LEN: usize = 512;

/// One line of classifier stderr.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Diagnostic {
    Info(String),
    Warning(String),
    Error(String),
    /// Anything that is not one of the structured forms above.
    #[serde(skip)]
    Plain(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VerdictReply {
    result: u8,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FailureReply {
    error: String,
}

/// Stdout reply from the classifier. Exactly one of the two shapes; a line
/// carrying both `result` and `error`, or any other key, is malformed.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Reply {
    Verdict(VerdictReply),
    Failure(FailureReply),
}

/// Parse a single stderr line. Blank lines yield `None`.
pub fn parse_diagnostic(line: &str) -> Option<Diagnostic> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') {
        if let Ok(diagnostic) = serde_json::from_str::<Diagnostic>(trimmed) {
            return Some(diagnostic);
        }
    }

    Some(Diagnostic::Plain(trimmed.to_string()))
}

/// Parse all stderr output into diagnostics, in order.
pub fn parse_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    stderr.lines().filter_map(parse_diagnostic).collect()
}

/// The last structured `{"error": ...}` line on stderr, if any.
///
/// When present after the process exits, this is the authoritative failure
/// reason regardless of exit status or stdout.
pub fn last_reported_error(diagnostics: &[Diagnostic]) -> Option<&str> {
    diagnostics.iter().rev().find_map(|d| match d {
        Diagnostic::Error(message) => Some(message.as_str()),
        _ => None,
    })
}

/// Parse classifier stdout into a spam verdict.
pub fn parse_verdict(stdout: &str) -> Result<bool, ClassifierError> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let line = match lines.as_slice() {
        [] => return Err(ClassifierError::Parse("empty output".to_string())),
        [line] => *line,
        more => {
            return Err(ClassifierError::Parse(format!(
                "expected exactly one output line, got {}",
                more.len()
            )))
        }
    };

    let reply: Reply = serde_json::from_str(line)
        .map_err(|e| ClassifierError::Parse(format!("{}: {}", e, truncate(line))))?;

    match reply {
        Reply::Verdict(VerdictReply { result: 0 }) => Ok(false),
        Reply::Verdict(VerdictReply { result: 1 }) => Ok(true),
        Reply::Verdict(VerdictReply { result }) => Err(ClassifierError::Parse(format!(
            "unexpected result value {}",
            result
        ))),
        Reply::Failure(FailureReply { error }) => Err(ClassifierError::Reported(error)),
    }
}

/// Turn a finished process's exit code and captured output into a verdict.
///
/// Precedence: a structured stderr error wins, then a non-zero exit status,
/// then the stdout reply.
pub fn interpret_output(
    success: bool,
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> Result<bool, ClassifierError> {
    let diagnostics = parse_diagnostics(stderr);

    if let Some(message) = last_reported_error(&diagnostics) {
        return Err(ClassifierError::Reported(message.to_string()));
    }

    if !success {
        return Err(ClassifierError::ExitStatus {
            code,
            stderr: tail(stderr),
        });
    }

    parse_verdict(stdout)
}

fn truncate(s: &str) -> String {
    if s.len() <= STDERR_TAIL_LEN {
        return s.to_string();
    }
    let mut end = STDERR_TAIL_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

fn tail(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() <= STDERR_TAIL_LEN {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_LEN;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}
