//! Startup reconciliation for crash recovery.
//!
//! The classification queue lives in memory. Jobs queued or running when the
//! previous instance stopped are lost, and their events would stay `pending`
//! forever. On startup every event still awaiting a verdict is queued again.

use tracing::{error, info};

use crate::state_machine::store::ModerationStore;

/// Requeue classification for every event still awaiting a verdict.
///
/// Call this after the store is built and the worker's receiver exists, but
/// before accepting traffic. Returns how many events were requeued.
pub async fn requeue_pending_classifications(store: &ModerationStore) -> usize {
    info!("Starting crash recovery reconciliation...");

    let pending = match store.list_awaiting_classification().await {
        Ok(pending) => pending,
        Err(e) => {
            error!(
                "Failed to list events awaiting classification: {}. Reconciliation aborted.",
                e
            );
            return 0;
        }
    };

    if pending.is_empty() {
        info!("No events awaiting classification. Reconciliation complete.");
        return 0;
    }

    info!(
        "Found {} event(s) awaiting classification, requeueing...",
        pending.len()
    );

    let mut requeued = 0;
    for event in pending {
        match store.reclassify(event.id).await {
            Ok(_) => requeued += 1,
            Err(e) => error!("Failed to requeue event {}: {}", event.id, e),
        }
    }

    info!(
        "Crash recovery reconciliation complete: {} event(s) requeued.",
        requeued
    );
    requeued
}
