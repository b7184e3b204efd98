// crates/server/src/sweep.rs
//! Periodic eviction sweep.
//!
//! Runs off the hot read/write path so status polls stay O(1). Evicted
//! records take their on-disk artifacts with them; after eviction the id is
//! indistinguishable from one that was never issued.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Spawn the sweep loop. Stops when `shutdown` fires.
pub fn spawn_eviction_sweep(state: Arc<AppState>, shutdown: CancellationToken) {
    let interval = state.config.sweep_interval;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            sweep_once(&state).await;
        }
    });
}

/// One eviction pass: drop expired records and delete their artifacts.
pub async fn sweep_once(state: &AppState) {
    let evicted = state.store.evict_expired(Utc::now());
    if evicted.is_empty() {
        return;
    }
    tracing::info!(count = evicted.len(), "evicted expired jobs");
    for snap in evicted {
        if let Some(artifact) = snap.artifact {
            if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
                tracing::debug!(
                    job_id = %snap.id,
                    path = %artifact.path.display(),
                    error = %e,
                    "could not remove evicted artifact"
                );
            }
        }
    }
}
