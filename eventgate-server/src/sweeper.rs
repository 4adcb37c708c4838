//! Expiry sweep.
//!
//! Marks active events whose end time has passed as inactive. Candidates are
//! selected without a lock; each one is then re-checked by the state machine
//! against the record loaded under its lock, so an edit that moved the end
//! time forward is never overwritten.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::ModerationError;
use crate::state_machine::event::ModerationEvent;
use crate::state_machine::state::{EventId, Lifecycle};
use crate::state_machine::store::ModerationStore;

impl ModerationStore {
    /// Expire every active event with `end_at < now`. Returns how many
    /// events became inactive.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, ModerationError> {
        let candidates = self.repository().find_expired(now).await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        debug!("Expiry sweep found {} candidate(s)", candidates.len());

        let mut expired = 0;
        for id in candidates {
            match self.expire_one(id, now).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(ModerationError::NotFound(_)) => {
                    debug!("Event {} was deleted before it could be expired", id);
                }
                Err(e) => {
                    error!("Failed to expire event {}: {}", id, e);
                }
            }
        }

        if expired > 0 {
            info!("Expiry sweep marked {} event(s) inactive", expired);
        }
        Ok(expired)
    }

    async fn expire_one(&self, id: EventId, now: DateTime<Utc>) -> Result<bool, ModerationError> {
        let result = async {
            let _guard = self.lock_event(id).await;
            let current = self.load(id).await?;
            let was_active = current.lifecycle == Lifecycle::Active;

            let after = self
                .process_at(current, ModerationEvent::Expired, now)
                .await?;
            Ok::<_, ModerationError>(was_active && after.lifecycle == Lifecycle::Inactive)
        }
        .await;
        self.release_if_missing(id, result).await
    }
}

/// Run the expiry sweep every `period` until the task is dropped.
pub async fn sweep_loop(store: Arc<ModerationStore>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if let Err(e) = store.sweep_expired(store.now()).await {
            warn!("Expiry sweep failed: {}", e);
        }
    }
}
