//! Classification dispatch.
//!
//! Creating or editing an event must not wait for the classifier, which can
//! take minutes on a cold start. The store pushes a [`ClassificationJob`]
//! onto an unbounded queue and returns; [`classification_worker_loop`]
//! drains the queue and runs jobs concurrently, bounded by a semaphore.
//! Results go back through the store, which discards any that are stale.

use std::sync::Arc;
use std::time::Duration;

use eventgate_core::{Classifier, ClassifierError};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::state_machine::state::EventId;
use crate::state_machine::store::ModerationStore;

/// A request to classify one revision of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationJob {
    pub event_id: EventId,
    pub revision: u64,
    pub title: String,
    pub description: String,
}

pub type ClassificationReceiver = mpsc::UnboundedReceiver<ClassificationJob>;

/// Sending half of the classification queue.
#[derive(Debug, Clone)]
pub struct ClassificationQueue {
    tx: mpsc::UnboundedSender<ClassificationJob>,
}

impl ClassificationQueue {
    pub fn new() -> (Self, ClassificationReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a job. Returns false if no worker is listening any more.
    ///
    /// A dropped job leaves the event `pending`; startup reconciliation
    /// queues it again.
    pub fn enqueue(&self, job: ClassificationJob) -> bool {
        let event_id = job.event_id;
        let revision = job.revision;
        match self.tx.send(job) {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "Classification worker is gone; event {} revision {} stays pending",
                    event_id, revision
                );
                false
            }
        }
    }
}

/// What classification of a job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationOutcome {
    Verdict { is_spam: bool },
    /// Every attempt failed; the event must stay `pending`.
    Failed { error: String },
}

/// Retry schedule for a single classifier call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Retry without waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based): doubling from
    /// `initial_backoff`, capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Classify one text fragment, retrying failures per `policy`.
pub async fn classify_with_retry(
    classifier: &dyn Classifier,
    text: &str,
    policy: &RetryPolicy,
) -> Result<bool, ClassifierError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match classifier.classify(text).await {
            Ok(is_spam) => return Ok(is_spam),
            Err(e) if attempt < attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "Classifier attempt {}/{} failed: {}; retrying in {:?}",
                    attempt, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Classify a job: the title first, then the description only if the title
/// is clean.
pub async fn classify_event(
    classifier: &dyn Classifier,
    job: &ClassificationJob,
    policy: &RetryPolicy,
) -> ClassificationOutcome {
    match classify_with_retry(classifier, &job.title, policy).await {
        Ok(true) => return ClassificationOutcome::Verdict { is_spam: true },
        Ok(false) => {}
        Err(e) => {
            return ClassificationOutcome::Failed {
                error: format!("title: {}", e),
            }
        }
    }

    match classify_with_retry(classifier, &job.description, policy).await {
        Ok(is_spam) => ClassificationOutcome::Verdict { is_spam },
        Err(e) => ClassificationOutcome::Failed {
            error: format!("description: {}", e),
        },
    }
}

/// Classify a job and record the outcome.
pub async fn run_job(
    store: &ModerationStore,
    classifier: &dyn Classifier,
    policy: &RetryPolicy,
    job: ClassificationJob,
) {
    let outcome = classify_event(classifier, &job, policy).await;
    if let ClassificationOutcome::Failed { error } = &outcome {
        error!(
            "Classification of event {} revision {} failed after {} attempt(s): {}",
            job.event_id, job.revision, policy.max_attempts, error
        );
    }

    if let Err(e) = store
        .apply_classification(job.event_id, job.revision, outcome)
        .await
    {
        error!(
            "Failed to record classification for event {}: {}",
            job.event_id, e
        );
    }
}

/// Drain the classification queue until every sender is dropped.
///
/// Each job runs on its own task; at most `max_concurrency` run at once.
pub async fn classification_worker_loop(
    store: Arc<ModerationStore>,
    classifier: Arc<dyn Classifier>,
    policy: RetryPolicy,
    max_concurrency: usize,
    mut jobs: ClassificationReceiver,
) {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    info!(
        "Classification worker started (max concurrency {})",
        max_concurrency.max(1)
    );

    while let Some(job) = jobs.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let store = store.clone();
        let classifier = classifier.clone();
        let policy = policy.clone();
        tokio::spawn(async move {
            run_job(&store, classifier.as_ref(), &policy, job).await;
            drop(permit);
        });
    }

    info!("Classification queue closed; worker exiting");
}
