//! Classifier worker adapter.
//!
//! Each call launches one short-lived classifier process, feeds it the text on
//! stdin and waits for its single-line verdict. There is no retry here; callers
//! decide whether and how to retry.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::ClassifierError;
use crate::protocol::{interpret_output, parse_diagnostics, Diagnostic};

/// Default time allowed for one classification. The classifier may have to
/// download and load its model on a cold start.
pub const DEFAULT_CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How to launch the classifier process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Executable to run (e.g. `python3`).
    pub program: String,
    /// Arguments passed before any input (e.g. `-u scripts/spam_check_single.py`).
    pub args: Vec<String>,
    /// Wall-clock limit for a single call.
    pub timeout: Duration,
}

impl ClassifierConfig {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_CLASSIFIER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Scores a single text fragment as spam or not.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Returns `true` if the text is spam.
    async fn classify(&self, text: &str) -> Result<bool, ClassifierError>;
}

/// Classifier backed by an external process.
#[derive(Debug, Clone)]
pub struct ProcessClassifier {
    config: ClassifierConfig,
}

impl ProcessClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    async fn run(&self, text: &str) -> Result<std::process::Output, ClassifierError> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClassifierError::Launch {
                program: self.config.program.clone(),
                message: e.to_string(),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClassifierError::Io("classifier stdin was not captured".to_string()))?;
        let input = text.as_bytes().to_vec();

        // Feed stdin while draining stdout/stderr so a large input cannot
        // deadlock against a full output pipe.
        let writer = async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        };
        let (write_result, output) = tokio::join!(writer, child.wait_with_output());

        if let Err(e) = write_result {
            // A classifier that exits without reading all input closes the
            // pipe; its output still decides the outcome.
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                debug!("Classifier closed stdin early: {}", e);
            } else {
                return Err(ClassifierError::Io(format!("writing stdin: {}", e)));
            }
        }

        output.map_err(|e| ClassifierError::Io(format!("waiting for classifier: {}", e)))
    }
}

#[async_trait]
impl Classifier for ProcessClassifier {
    async fn classify(&self, text: &str) -> Result<bool, ClassifierError> {
        debug!(
            "Launching classifier {} ({} bytes of input)",
            self.config.program,
            text.len()
        );

        // Dropping the timed-out future drops the child, and kill_on_drop
        // terminates the process.
        let output = match timeout(self.config.timeout, self.run(text)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Classifier timed out after {:?}; process killed",
                    self.config.timeout
                );
                return Err(ClassifierError::Timeout {
                    after: self.config.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        log_diagnostics(&stderr);

        interpret_output(output.status.success(), output.status.code(), &stdout, &stderr)
    }
}

/// Surface classifier stderr to the log at the level it asked for.
fn log_diagnostics(stderr: &str) {
    for diagnostic in parse_diagnostics(stderr) {
        match diagnostic {
            Diagnostic::Info(message) => info!("[classifier] {}", message),
            Diagnostic::Warning(message) => warn!("[classifier] {}", message),
            Diagnostic::Error(message) => error!("[classifier] {}", message),
            Diagnostic::Plain(message) => debug!("[classifier] {}", message),
        }
    }
}
