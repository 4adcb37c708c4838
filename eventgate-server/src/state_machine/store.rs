//! Moderation store.
//!
//! The store is the only writer of event records. Every state change loads
//! the record under its per-event lock, runs the pure transition, persists
//! the result (including write-bound effects) and then hands the remaining
//! effects to the interpreter.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use super::event::ModerationEvent;
use super::interpreter::execute_effects;
use super::repository::EventRepository;
use super::state::{
    Event, EventId, Lifecycle, ModerationStatus, Report, ReportsState, UserId,
};
use super::transition::{transition, TransitionResult};
use crate::clock::{stored_precision, Clock};
use crate::dispatch::{ClassificationOutcome, ClassificationQueue};
use crate::error::ModerationError;
use crate::permissions::{check_can_modify, Actor};
use crate::validation::{EventDraft, EventPatch};

/// Thread-safe moderation store over an `EventRepository`.
///
/// # Concurrency
///
/// Each event has its own lock. The sequence "load record, transition,
/// persist" runs under it, so report submissions, verdicts, edits and the
/// expiry sweep never overwrite each other's changes.
pub struct ModerationStore {
    repo: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    queue: ClassificationQueue,
    event_locks: RwLock<HashMap<EventId, Arc<Mutex<()>>>>,
}

impl ModerationStore {
    pub fn new(
        repo: Arc<dyn EventRepository>,
        clock: Arc<dyn Clock>,
        queue: ClassificationQueue,
    ) -> Self {
        Self {
            repo,
            clock,
            queue,
            event_locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &Arc<dyn EventRepository> {
        &self.repo
    }

    /// Current time at stored precision.
    pub fn now(&self) -> DateTime<Utc> {
        stored_precision(self.clock.now())
    }

    /// Get or create the lock for an event.
    async fn get_or_create_event_lock(&self, id: EventId) -> Arc<Mutex<()>> {
        {
            let locks = self.event_locks.read().await;
            if let Some(lock) = locks.get(&id) {
                return lock.clone();
            }
        }

        let mut locks = self.event_locks.write().await;
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the per-event lock.
    pub(crate) async fn lock_event(&self, id: EventId) -> OwnedMutexGuard<()> {
        self.get_or_create_event_lock(id).await.lock_owned().await
    }

    /// Drop the lock entry of an event that no longer exists.
    ///
    /// Call only after releasing the guard. An entry some other task still
    /// holds or waits on is left in place; that task prunes it in turn.
    async fn forget_event_lock(&self, id: EventId) {
        let mut locks = self.event_locks.write().await;
        if locks
            .get(&id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&id);
        }
    }

    /// Pass `result` through, pruning the lock entry when it says the event
    /// is gone.
    pub(crate) async fn release_if_missing<T>(
        &self,
        id: EventId,
        result: Result<T, ModerationError>,
    ) -> Result<T, ModerationError> {
        if matches!(result, Err(ModerationError::NotFound(missing)) if missing == id) {
            self.forget_event_lock(id).await;
        }
        result
    }

    #[cfg(test)]
    pub(crate) async fn lock_entries(&self) -> usize {
        self.event_locks.read().await.len()
    }

    /// Load an event that the caller holds the lock for.
    pub(crate) async fn load(&self, id: EventId) -> Result<Event, ModerationError> {
        self.repo
            .get(id)
            .await?
            .ok_or(ModerationError::NotFound(id))
    }

    /// Run a transition on a record the caller holds the lock for.
    pub(crate) async fn process(
        &self,
        event: Event,
        input: ModerationEvent,
    ) -> Result<Event, ModerationError> {
        self.process_at(event, input, self.now()).await
    }

    pub(crate) async fn process_at(
        &self,
        event: Event,
        input: ModerationEvent,
        now: DateTime<Utc>,
    ) -> Result<Event, ModerationError> {
        let id = event.id;
        let now = stored_precision(now);
        let before = event.clone();
        debug!("Processing {} for event {}", input.log_summary(), id);

        let TransitionResult { event, effects } = transition(event, input, now);

        let event = if event != before {
            let clear_reports = effects.iter().any(|e| e.is_part_of_write());
            self.repo
                .update(&event, clear_reports)
                .await?
                .ok_or(ModerationError::NotFound(id))?
        } else {
            event
        };

        execute_effects(id, effects, &self.queue);
        Ok(event)
    }

    // =========================================================================
    // Content
    // =========================================================================

    /// Submit a new event. Classification is queued; the call does not wait
    /// for it.
    pub async fn create_event(
        &self,
        owner: UserId,
        mut draft: EventDraft,
    ) -> Result<Event, ModerationError> {
        draft.start_at = stored_precision(draft.start_at);
        draft.end_at = stored_precision(draft.end_at);
        draft.validate()?;

        let now = self.now();
        let unsaved = Event {
            id: EventId::UNASSIGNED,
            owner,
            title: draft.title,
            description: draft.description,
            start_at: draft.start_at,
            end_at: draft.end_at,
            status: ModerationStatus::Pending,
            lifecycle: Lifecycle::at(draft.end_at, now),
            reports_count: 0,
            reports_state: ReportsState::Normal,
            revision: 0,
            created_at: now,
            updated_at: now,
        };

        let TransitionResult { mut event, effects } =
            transition(unsaved, ModerationEvent::Created, now);
        event.id = self.repo.insert(&event).await?;

        info!(
            "Created event {} for user {} ({})",
            event.id, owner, event.lifecycle
        );
        execute_effects(event.id, effects, &self.queue);
        Ok(event)
    }

    /// Edit an event. Moderation restarts for the new content.
    pub async fn update_event(
        &self,
        actor: &Actor,
        id: EventId,
        patch: EventPatch,
    ) -> Result<Event, ModerationError> {
        let result: Result<Event, ModerationError> = async {
            let _guard = self.lock_event(id).await;
            let current = self.load(id).await?;
            check_can_modify(actor, &current)?;

            let mut edited = patch.apply_to(&current)?;
            edited.start_at = stored_precision(edited.start_at);
            edited.end_at = stored_precision(edited.end_at);
            self.process(edited, ModerationEvent::Edited).await
        }
        .await;
        self.release_if_missing(id, result).await
    }

    /// Delete an event and its reports.
    ///
    /// A classification still in flight for it finds nothing to update.
    pub async fn delete_event(&self, actor: &Actor, id: EventId) -> Result<(), ModerationError> {
        let result: Result<(), ModerationError> = async {
            let _guard = self.lock_event(id).await;
            let current = self.load(id).await?;
            check_can_modify(actor, &current)?;

            if !self.repo.delete(id).await? {
                return Err(ModerationError::NotFound(id));
            }
            info!("Deleted event {} (by user {})", id, actor.user_id);
            Ok(())
        }
        .await;

        if result.is_ok() {
            self.forget_event_lock(id).await;
        }
        self.release_if_missing(id, result).await
    }

    pub async fn get_event(&self, id: EventId) -> Result<Event, ModerationError> {
        self.load(id).await
    }

    /// Queue classification of the current content again.
    ///
    /// This is the recovery path for events left `pending` after the
    /// classifier failed.
    pub async fn reclassify(&self, id: EventId) -> Result<Event, ModerationError> {
        let result = async {
            let _guard = self.lock_event(id).await;
            let current = self.load(id).await?;
            self.process(current, ModerationEvent::ReclassifyRequested)
                .await
        }
        .await;
        self.release_if_missing(id, result).await
    }

    /// Apply the result of classifying `revision` of an event.
    ///
    /// Returns None when the event no longer exists; the result is dropped.
    pub async fn apply_classification(
        &self,
        id: EventId,
        revision: u64,
        outcome: ClassificationOutcome,
    ) -> Result<Option<Event>, ModerationError> {
        let input = match outcome {
            ClassificationOutcome::Verdict { is_spam } => {
                ModerationEvent::ClassificationFinished { revision, is_spam }
            }
            ClassificationOutcome::Failed { error } => {
                ModerationEvent::ClassificationFailed { revision, error }
            }
        };

        let result: Result<Event, ModerationError> = async {
            let _guard = self.lock_event(id).await;
            let current = self.load(id).await?;
            self.process(current, input).await
        }
        .await;

        match self.release_if_missing(id, result).await {
            Ok(event) => Ok(Some(event)),
            Err(ModerationError::NotFound(_)) => {
                debug!(
                    "Dropping classification result for deleted event {} (revision {})",
                    id, revision
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Set the reports state directly, regardless of the report count.
    pub async fn admin_set_reports_state(
        &self,
        id: EventId,
        state: ReportsState,
    ) -> Result<Event, ModerationError> {
        let result = async {
            let _guard = self.lock_event(id).await;
            let current = self.load(id).await?;
            self.process(current, ModerationEvent::AdminSetReportsState { state })
                .await
        }
        .await;
        self.release_if_missing(id, result).await
    }

    // =========================================================================
    // Listings
    // =========================================================================

    /// Events visible to the public.
    pub async fn list_public(&self) -> Result<Vec<Event>, ModerationError> {
        Ok(self.repo.list_public().await?)
    }

    /// Every event owned by `owner`, in any state.
    pub async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Event>, ModerationError> {
        Ok(self.repo.list_for_owner(owner).await?)
    }

    /// Events held by reports, each with its active reports.
    pub async fn list_pending_moderation(
        &self,
    ) -> Result<Vec<(Event, Vec<Report>)>, ModerationError> {
        Ok(self.repo.list_held_with_reports().await?)
    }

    /// Events still awaiting a classifier verdict.
    pub async fn list_awaiting_classification(&self) -> Result<Vec<Event>, ModerationError> {
        Ok(self.repo.list_by_status(ModerationStatus::Pending).await?)
    }

    pub async fn all_events(&self) -> Result<Vec<Event>, ModerationError> {
        Ok(self.repo.get_all().await?)
    }
}
