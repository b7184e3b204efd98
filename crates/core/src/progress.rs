// crates/core/src/progress.rs
//! The progress protocol between the automation routine and the job store.
//!
//! Progress arrives as a narrow, versionable message rather than ad hoc
//! callback fields: richer telemetry should extend [`ProgressUpdate`], not
//! bypass the store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One progress report from the automation routine.
///
/// Reports may arrive at any caller-defined cadence (typically once per
/// processed item); no field is required beyond the processed count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub processed_count: u64,
    /// Total units of work, once known. `None` during the initial
    /// indeterminate phase.
    pub total_count: Option<u64>,
    /// Human-readable marker of the unit currently being processed,
    /// e.g. the register number the automation is currently looking up.
    pub current_item: Option<String>,
}

impl ProgressUpdate {
    pub fn new(processed_count: u64, total_count: Option<u64>) -> Self {
        Self {
            processed_count,
            total_count,
            current_item: None,
        }
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.current_item = Some(item.into());
        self
    }
}

/// Callback sink the job runner hands to the automation routine.
///
/// The sink never blocks on the store for longer than one short atomic
/// update, so the routine may call it from its hot loop.
pub type ProgressSink = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;
