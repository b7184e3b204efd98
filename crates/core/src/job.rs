// crates/core/src/job.rs
//! Job record types: identity, status, progress, and terminal outcomes.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique identifier for a job, assigned at submission.
///
/// The id is the sole external handle to a job; after eviction it is
/// indistinguishable from an id that was never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id from its string form. Returns `None` for anything that is
    /// not a well-formed id; callers treat that the same as an unknown id.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a job.
///
/// Transitions only along `Pending → Processing → {Completed | Failed}`.
/// `Completed` and `Failed` are terminal: once written, the status (and the
/// associated outcome) never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobStatus {
    Pending = 0,
    Processing = 1,
    Completed = 2,
    Failed = 3,
}

impl JobStatus {
    /// Convert a raw `u8` into a status variant.
    /// Returns `None` for values outside the valid range.
    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Pending),
            1 => Some(Self::Processing),
            2 => Some(Self::Completed),
            3 => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this status permits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Machine-readable classification of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The external automation routine could not complete (portal
    /// unreachable, layout mismatch, partial extraction failure).
    AutomationFailure,
    /// The job exceeded its maximum lifetime while processing.
    Timeout,
    /// The job was cancelled (evicted or explicitly aborted) before it
    /// produced an outcome.
    Cancelled,
}

/// Why a job reached the `failed` state. Present only on failed jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: FailureKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Reference to the artifact produced by a completed job.
///
/// Resolved to bytes by the download path; the orchestration core treats the
/// file as an opaque blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: String,
}

/// Immutable copy of a job record at a point in time.
///
/// This is the only view of a job the read paths ever see.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub processed_count: u64,
    /// Total units of work, once the automation routine has reported it.
    pub total_count: Option<u64>,
    /// Human-readable marker of the unit currently being processed.
    pub current_item: Option<String>,
    pub error: Option<JobError>,
    pub artifact: Option<ArtifactRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    /// Percentage of work done, when the total is known. `None` during the
    /// initial indeterminate phase (and whenever the total is zero).
    pub fn progress_percentage(&self) -> Option<u8> {
        match self.total_count {
            Some(total) if total > 0 => {
                // Widened so an absurd total reported by the automation
                // routine cannot overflow the multiply.
                let done = u128::from(self.processed_count.min(total));
                Some(((done * 100) / u128::from(total)) as u8)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_round_trip() {
        let id = JobId::generate();
        let parsed = JobId::parse(&id.to_string());
        assert_eq!(parsed, Some(id));
    }

    #[test]
    fn test_job_id_rejects_garbage() {
        assert!(JobId::parse("not-a-job-id").is_none());
        assert!(JobId::parse("").is_none());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_from_u8_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_u8(status as u8), Some(status));
        }
        assert_eq!(JobStatus::from_u8(42), None);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::to_string(&FailureKind::AutomationFailure).unwrap(),
            "\"automation_failure\""
        );
    }

    #[test]
    fn test_progress_percentage() {
        let mut snap = JobSnapshot {
            id: JobId::generate(),
            status: JobStatus::Processing,
            processed_count: 5,
            total_count: Some(10),
            current_item: None,
            error: None,
            artifact: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(snap.progress_percentage(), Some(50));

        snap.total_count = None;
        assert_eq!(snap.progress_percentage(), None);

        snap.total_count = Some(0);
        assert_eq!(snap.progress_percentage(), None);

        // A stale total never pushes the percentage past 100.
        snap.processed_count = 20;
        snap.total_count = Some(10);
        assert_eq!(snap.progress_percentage(), Some(100));

        // Absurd counts from a misbehaving reporter must not overflow.
        snap.processed_count = u64::MAX;
        snap.total_count = Some(u64::MAX);
        assert_eq!(snap.progress_percentage(), Some(100));

        snap.processed_count = u64::MAX / 2;
        assert_eq!(snap.progress_percentage(), Some(49));
    }
}
