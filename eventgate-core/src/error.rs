use std::fmt;
use std::time::Duration;

/// Reason a single classifier invocation failed.
///
/// Every variant is per-call: nothing here is fatal to the host process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    /// The classifier executable could not be started.
    Launch { program: String, message: String },
    /// Writing stdin or collecting output failed.
    Io(String),
    /// The process did not finish in time and was killed.
    Timeout { after: Duration },
    /// The process exited unsuccessfully without a structured error.
    ExitStatus { code: Option<i32>, stderr: String },
    /// The classifier reported `{"error": ...}` on stdout or stderr.
    Reported(String),
    /// Stdout was not a single valid reply line.
    Parse(String),
}

impl fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch { program, message } => {
                write!(f, "failed to launch classifier `{}`: {}", program, message)
            }
            Self::Io(message) => write!(f, "classifier i/o error: {}", message),
            Self::Timeout { after } => {
                write!(f, "classifier timed out after {}ms", after.as_millis())
            }
            Self::ExitStatus { code, stderr } => {
                match code {
                    Some(code) => write!(f, "classifier exited with status {}", code)?,
                    None => write!(f, "classifier terminated by signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            Self::Reported(message) => write!(f, "classifier reported an error: {}", message),
            Self::Parse(message) => write!(f, "malformed classifier output: {}", message),
        }
    }
}

impl std::error::Error for ClassifierError {}
