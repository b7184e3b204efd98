// crates/core/src/store.rs
//! In-memory job store: the single source of truth for job records.
//!
//! [`JobState`] holds one job's mutable record. Status and the processed
//! counter are atomics so status polls never contend with a busy runner;
//! the remaining fields change together with status and sit behind a
//! short-held `RwLock` that is never held across an await point.
//!
//! [`JobStore`] maps ids to records. All cross-record state lives here;
//! runners only ever touch their own record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;
use crate::job::{ArtifactRef, JobError, JobId, JobSnapshot, JobStatus};
use crate::progress::ProgressUpdate;

/// Fields of a job record that change together with the status.
struct Inner {
    total: Option<u64>,
    current_item: Option<String>,
    error: Option<JobError>,
    artifact: Option<ArtifactRef>,
    updated_at: DateTime<Utc>,
}

/// Mutable state of a single job.
///
/// Mutated exclusively by the job's own runner while live; immutable after
/// the first terminal write. Terminal transitions are first-caller-wins:
/// a second `complete`/`fail` for the same job is rejected with
/// [`StoreError::Terminal`], never silently overwritten.
pub struct JobState {
    id: JobId,
    created_at: DateTime<Utc>,
    status: AtomicU8,
    processed: AtomicU64,
    inner: RwLock<Inner>,
    cancel: CancellationToken,
}

impl JobState {
    fn new(id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            status: AtomicU8::new(JobStatus::Pending as u8),
            processed: AtomicU64::new(0),
            inner: RwLock::new(Inner {
                total: None,
                current_item: None,
                error: None,
                artifact: None,
                updated_at: now,
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Current status. Lock-free.
    pub fn status(&self) -> JobStatus {
        // A corrupt discriminant can only come from a torn write, which the
        // store never performs; treat it as failed rather than panic.
        JobStatus::from_u8(self.status.load(Ordering::Acquire)).unwrap_or(JobStatus::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Token the runner and the automation routine watch for cancellation.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal the job's runner to stop driving the automation routine.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Merge a progress report into the record.
    ///
    /// Promotes `pending` to `processing`, keeps `processed_count`
    /// monotonically non-decreasing, and bumps `updated_at`. Rejected once
    /// the job is terminal.
    pub fn update_progress(&self, update: ProgressUpdate) -> Result<(), StoreError> {
        let mut inner = self.write_inner();
        if self.is_terminal() {
            return Err(StoreError::Terminal { id: self.id });
        }
        self.status
            .store(JobStatus::Processing as u8, Ordering::Release);
        // Progress never moves backwards, even if callbacks race.
        self.processed
            .fetch_max(update.processed_count, Ordering::AcqRel);
        if update.total_count.is_some() {
            inner.total = update.total_count;
        }
        if update.current_item.is_some() {
            inner.current_item = update.current_item;
        }
        inner.updated_at = Utc::now();
        Ok(())
    }

    /// Terminal write: the job produced its artifact.
    pub fn complete(&self, artifact: ArtifactRef) -> Result<(), StoreError> {
        let mut inner = self.write_inner();
        if self.is_terminal() {
            return Err(StoreError::Terminal { id: self.id });
        }
        inner.artifact = Some(artifact);
        inner.current_item = None;
        inner.updated_at = Utc::now();
        self.status
            .store(JobStatus::Completed as u8, Ordering::Release);
        Ok(())
    }

    /// Terminal write: the job failed.
    pub fn fail(&self, error: JobError) -> Result<(), StoreError> {
        let mut inner = self.write_inner();
        if self.is_terminal() {
            return Err(StoreError::Terminal { id: self.id });
        }
        inner.error = Some(error);
        inner.current_item = None;
        inner.updated_at = Utc::now();
        self.status.store(JobStatus::Failed as u8, Ordering::Release);
        Ok(())
    }

    /// Immutable copy of the record, reflecting the latest committed state.
    pub fn snapshot(&self) -> JobSnapshot {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        JobSnapshot {
            id: self.id,
            status: self.status(),
            processed_count: self.processed.load(Ordering::Acquire),
            total_count: inner.total,
            current_item: inner.current_item.clone(),
            error: inner.error.clone(),
            artifact: inner.artifact.clone(),
            created_at: self.created_at,
            updated_at: inner.updated_at,
        }
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .updated_at
    }

    fn write_inner(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        // A poisoned lock means a writer panicked mid-update; the record is
        // still structurally sound, so recover rather than wedge the job.
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Authoritative mapping from job id to job record.
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Arc<JobState>>>,
    retention: chrono::Duration,
}

impl JobStore {
    /// Create a store whose records are evicted once `retention` has elapsed
    /// past their last update.
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention: chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
        }
    }

    /// Insert a fresh record at `pending` and return it.
    ///
    /// The returned id is never one already in use by a live record.
    pub fn create(&self) -> Arc<JobState> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        loop {
            let id = JobId::generate();
            if jobs.contains_key(&id) {
                continue;
            }
            let state = Arc::new(JobState::new(id));
            jobs.insert(id, Arc::clone(&state));
            return state;
        }
    }

    /// Snapshot of a single record, or `None` for unknown/evicted ids.
    pub fn get(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|s| s.snapshot())
    }

    /// Shared handle to a record, for the runner's write path.
    pub fn state(&self, id: JobId) -> Option<Arc<JobState>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Snapshots of every live record, newest first.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let mut all: Vec<JobSnapshot> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|s| s.snapshot())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove records whose retention window has elapsed past `updated_at`.
    ///
    /// Still-running evictees get their cancellation token triggered so the
    /// runner releases its admission slot promptly. Returns snapshots of the
    /// removed records so the caller can clean up artifact/spool files.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> Vec<JobSnapshot> {
        let expired: Vec<JobId> = {
            let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
            jobs.iter()
                .filter(|(_, s)| now.signed_duration_since(s.updated_at()) >= self.retention)
                .map(|(id, _)| *id)
                .collect()
        };
        if expired.is_empty() {
            return Vec::new();
        }

        let mut evicted = Vec::with_capacity(expired.len());
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        for id in expired {
            if let Some(state) = jobs.remove(&id) {
                if !state.is_terminal() {
                    state.cancel();
                }
                evicted.push(state.snapshot());
            }
        }
        evicted
    }
}
