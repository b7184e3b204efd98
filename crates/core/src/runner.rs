// crates/core/src/runner.rs
//! Job runner: drives one external scrape run per job and translates its
//! callbacks into job store writes.
//!
//! Every failure mode inside a runner (automation errors, panics, the
//! lifetime ceiling, cancellation) is caught and converted into exactly one
//! terminal store write. A job record is never left stuck in `processing`.

use std::sync::Arc;
use std::time::Duration;

use crate::admission::AdmissionController;
use crate::error::ScrapeError;
use crate::job::{FailureKind, JobError};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::scrape::{ScrapeRequest, Scraper};
use crate::store::{JobState, JobStore};

/// Spawns and supervises job runners under the admission budget.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<JobStore>,
    admission: AdmissionController,
    /// Server-side backstop: a job still processing past this ceiling is
    /// force-failed and its scraper cancelled, independent of whether any
    /// client is still polling.
    max_lifetime: Duration,
}

impl JobRunner {
    pub fn new(store: Arc<JobStore>, admission: AdmissionController, max_lifetime: Duration) -> Self {
        Self {
            store,
            admission,
            max_lifetime,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Hand a freshly created job to the runner.
    ///
    /// Returns immediately; the work runs concurrently with the caller.
    /// The job stays `pending` (no progress fields populated) while it waits
    /// for a worker slot.
    pub fn spawn(&self, job: Arc<JobState>, scraper: Arc<dyn Scraper>, request: ScrapeRequest) {
        let admission = self.admission.clone();
        let max_lifetime = self.max_lifetime;

        tokio::spawn(async move {
            let cancel = job.cancel_token();
            // The lifetime ceiling is armed at submission, so time spent
            // queued counts toward it. A saturated service sheds stale
            // queued work instead of letting it wait forever.
            let deadline = tokio::time::Instant::now() + max_lifetime;

            let permit = tokio::select! {
                permit = admission.admit() => permit,
                _ = tokio::time::sleep_until(deadline) => {
                    record_failure(
                        &job,
                        FailureKind::Timeout,
                        &format!(
                            "job exceeded its maximum lifetime of {}s while queued",
                            max_lifetime.as_secs()
                        ),
                    );
                    remove_spooled_roster(&request).await;
                    return;
                }
                _ = cancel.cancelled() => {
                    record_failure(&job, FailureKind::Cancelled, "job cancelled while queued");
                    remove_spooled_roster(&request).await;
                    return;
                }
            };

            tracing::info!(job_id = %job.id(), "worker slot acquired, starting scrape");
            // Visible as `processing` from the first instant a worker owns it.
            if job
                .update_progress(ProgressUpdate::new(0, None))
                .is_err()
            {
                // Terminal before it ever started (evicted or aborted).
                remove_spooled_roster(&request).await;
                return;
            }

            let sink: ProgressSink = {
                let job = Arc::clone(&job);
                Arc::new(move |update| {
                    if let Err(e) = job.update_progress(update) {
                        tracing::debug!(job_id = %job.id(), error = %e, "dropping progress update for terminal job");
                    }
                })
            };

            // The scraper runs in its own task so a panic inside it is
            // contained and classified, never a wedged record.
            let mut scrape_task = tokio::spawn({
                let request = request.clone();
                let cancel = cancel.clone();
                async move { scraper.run(&request, sink, cancel).await }
            });

            let outcome = tokio::select! {
                joined = &mut scrape_task => match joined {
                    Ok(Ok(artifact)) => Ok(artifact),
                    Ok(Err(ScrapeError::Cancelled)) => {
                        Err(JobError::new(FailureKind::Cancelled, "scrape cancelled"))
                    }
                    Ok(Err(e)) => Err(JobError::new(FailureKind::AutomationFailure, e.to_string())),
                    Err(join_err) => Err(JobError::new(
                        FailureKind::AutomationFailure,
                        format!("scrape task aborted: {join_err}"),
                    )),
                },
                _ = tokio::time::sleep_until(deadline) => {
                    cancel.cancel();
                    scrape_task.abort();
                    Err(JobError::new(
                        FailureKind::Timeout,
                        format!(
                            "job exceeded its maximum lifetime of {}s",
                            max_lifetime.as_secs()
                        ),
                    ))
                }
                _ = cancel.cancelled() => {
                    scrape_task.abort();
                    Err(JobError::new(FailureKind::Cancelled, "job cancelled"))
                }
            };

            match outcome {
                Ok(artifact) => {
                    tracing::info!(job_id = %job.id(), artifact = %artifact.path.display(), "job completed");
                    if let Err(e) = job.complete(artifact) {
                        tracing::warn!(job_id = %job.id(), error = %e, "completion lost the terminal race");
                    }
                }
                Err(error) => {
                    record_failure(&job, error.kind, &error.message);
                    remove_partial_output(&request).await;
                }
            }

            // Slot frees here; the next queued job (if any) starts.
            drop(permit);
            remove_spooled_roster(&request).await;
        });
    }
}

fn record_failure(job: &JobState, kind: FailureKind, message: &str) {
    tracing::error!(job_id = %job.id(), kind = ?kind, message = %message, "job failed");
    if let Err(e) = job.fail(JobError::new(kind, message)) {
        tracing::warn!(job_id = %job.id(), error = %e, "failure write lost the terminal race");
    }
}

/// The spooled roster copy is only needed while the scrape runs.
async fn remove_spooled_roster(request: &ScrapeRequest) {
    if let Err(e) = tokio::fs::remove_file(&request.roster_path).await {
        tracing::debug!(path = %request.roster_path.display(), error = %e, "could not remove spooled roster");
    }
}

/// A killed or failed scraper may leave a half-written spreadsheet behind;
/// it is never served, so it is removed with the job's failure.
async fn remove_partial_output(request: &ScrapeRequest) {
    match tokio::fs::remove_file(&request.output_path).await {
        Ok(()) => {
            tracing::debug!(path = %request.output_path.display(), "removed partial output of failed job");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %request.output_path.display(), error = %e, "could not remove partial output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ArtifactRef, JobStatus};
    use crate::scrape::FnScraper;
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    fn test_runner(limit: usize, max_lifetime: Duration) -> JobRunner {
        JobRunner::new(
            Arc::new(JobStore::new(Duration::from_secs(3600))),
            AdmissionController::new(limit),
            max_lifetime,
        )
    }

    fn request() -> ScrapeRequest {
        ScrapeRequest {
            roster_path: PathBuf::from("/nonexistent/roster.csv"),
            portal_url: "https://results.example.edu".to_string(),
            subject_codes: Vec::new(),
            output_path: PathBuf::from("/tmp/out.xlsx"),
        }
    }

    fn artifact() -> ArtifactRef {
        ArtifactRef {
            path: PathBuf::from("/tmp/out.xlsx"),
            file_name: "out.xlsx".to_string(),
            content_type: "application/octet-stream".to_string(),
        }
    }

    async fn wait_for_status(store: &JobStore, id: crate::job::JobId, status: JobStatus) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if store.get(id).map(|s| s.status) == Some(status) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("job never reached {status}"));
    }

    #[tokio::test]
    async fn test_successful_run_reports_progress_then_completes() {
        let runner = test_runner(2, Duration::from_secs(30));
        let job = runner.store().create();
        let id = job.id();

        let scraper = Arc::new(FnScraper::new(|_req, progress: ProgressSink, _cancel| async move {
            for i in 1..=10u64 {
                progress(ProgressUpdate::new(i, Some(10)).with_item(format!("item-{i}")));
            }
            Ok(artifact())
        }));
        runner.spawn(job, scraper, request());

        wait_for_status(runner.store(), id, JobStatus::Completed).await;
        let snap = runner.store().get(id).unwrap();
        assert_eq!(snap.processed_count, 10);
        assert_eq!(snap.total_count, Some(10));
        assert!(snap.artifact.is_some());
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_automation_error_retains_partial_progress() {
        let runner = test_runner(2, Duration::from_secs(30));
        let job = runner.store().create();
        let id = job.id();

        // Fails partway through, after 3 of 10 items.
        let scraper = Arc::new(FnScraper::new(|_req, progress: ProgressSink, _cancel| async move {
            for i in 1..=3u64 {
                progress(ProgressUpdate::new(i, Some(10)));
            }
            Err(ScrapeError::automation("portal layout changed"))
        }));
        runner.spawn(job, scraper, request());

        wait_for_status(runner.store(), id, JobStatus::Failed).await;
        let snap = runner.store().get(id).unwrap();
        assert_eq!(snap.processed_count, 3);
        let error = snap.error.unwrap();
        assert_eq!(error.kind, FailureKind::AutomationFailure);
        assert!(error.message.contains("portal layout changed"));
        assert!(snap.artifact.is_none());
    }

    #[tokio::test]
    async fn test_panicking_scraper_fails_the_job_not_the_process() {
        let runner = test_runner(1, Duration::from_secs(30));
        let job = runner.store().create();
        let id = job.id();

        let scraper = Arc::new(FnScraper::new(|_req, _progress, _cancel| async move {
            panic!("scraper bug")
        }));
        runner.spawn(job, scraper, request());

        wait_for_status(runner.store(), id, JobStatus::Failed).await;
        let snap = runner.store().get(id).unwrap();
        assert_eq!(snap.error.unwrap().kind, FailureKind::AutomationFailure);
        // The worker slot was released despite the panic.
        assert_eq!(runner.admission().available(), 1);
    }

    #[tokio::test]
    async fn test_lifetime_ceiling_force_fails_with_timeout() {
        let runner = test_runner(1, Duration::from_millis(50));
        let job = runner.store().create();
        let id = job.id();

        let scraper = Arc::new(FnScraper::new(|_req, _progress, cancel: CancellationToken| async move {
            // A scraper that never finishes on its own.
            cancel.cancelled().await;
            Err(ScrapeError::Cancelled)
        }));
        runner.spawn(job, scraper, request());

        wait_for_status(runner.store(), id, JobStatus::Failed).await;
        let error = runner.store().get(id).unwrap().error.unwrap();
        assert_eq!(error.kind, FailureKind::Timeout);
        // The slot is reclaimed even though the client never polled again.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(runner.admission().available(), 1);
    }

    #[tokio::test]
    async fn test_queued_time_counts_toward_lifetime() {
        // The ceiling is armed at submission, so a job can time out without
        // ever being admitted.
        let store = Arc::new(JobStore::new(Duration::from_secs(3600)));
        let admission = AdmissionController::new(1);
        let blocking_runner =
            JobRunner::new(Arc::clone(&store), admission.clone(), Duration::from_secs(30));
        let queued_runner =
            JobRunner::new(Arc::clone(&store), admission, Duration::from_millis(50));

        let hold = Arc::new(tokio::sync::Notify::new());
        let release = Arc::clone(&hold);
        let blocker_scraper = Arc::new(FnScraper::new(move |_req, _progress, _cancel| {
            let hold = Arc::clone(&hold);
            async move {
                hold.notified().await;
                Ok(artifact())
            }
        }));
        let blocker = store.create();
        let blocker_id = blocker.id();
        blocking_runner.spawn(blocker, blocker_scraper, request());
        wait_for_status(&store, blocker_id, JobStatus::Processing).await;

        let queued = store.create();
        let queued_id = queued.id();
        let never_runs = Arc::new(FnScraper::new(|_req, _progress, _cancel| async move {
            Ok(artifact())
        }));
        queued_runner.spawn(queued, never_runs, request());

        // The slot never frees, yet the queued job still hits its ceiling.
        wait_for_status(&store, queued_id, JobStatus::Failed).await;
        let error = store.get(queued_id).unwrap().error.unwrap();
        assert_eq!(error.kind, FailureKind::Timeout);
        assert!(error.message.contains("while queued"));

        release.notify_one();
        wait_for_status(&store, blocker_id, JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn test_failed_run_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(1, Duration::from_secs(30));
        let job = runner.store().create();
        let id = job.id();
        let mut req = request();
        req.output_path = dir.path().join("results.xlsx");
        let output_path = req.output_path.clone();

        // Writes half a spreadsheet, then dies.
        let scraper = Arc::new(FnScraper::new(|req: ScrapeRequest, _progress, _cancel| async move {
            tokio::fs::write(&req.output_path, b"partial").await?;
            Err(ScrapeError::automation("browser crashed mid-write"))
        }));
        runner.spawn(job, scraper, req);

        wait_for_status(runner.store(), id, JobStatus::Failed).await;
        // Removal follows the terminal write.
        tokio::time::timeout(Duration::from_secs(2), async {
            while output_path.exists() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("partial output of a failed job should be removed");
    }

    #[tokio::test]
    async fn test_cancellation_while_queued() {
        let runner = test_runner(1, Duration::from_secs(30));

        // Occupy the only slot.
        let blocker = runner.store().create();
        let blocker_id = blocker.id();
        let hold = Arc::new(tokio::sync::Notify::new());
        let release = Arc::clone(&hold);
        let scraper = Arc::new(FnScraper::new(move |_req, _progress, _cancel| {
            let hold = Arc::clone(&hold);
            async move {
                hold.notified().await;
                Ok(artifact())
            }
        }));
        runner.spawn(blocker, Arc::clone(&scraper) as Arc<dyn Scraper>, request());
        wait_for_status(runner.store(), blocker_id, JobStatus::Processing).await;

        // Queue a second job, then cancel it before a slot frees.
        let queued = runner.store().create();
        let queued_id = queued.id();
        runner.spawn(Arc::clone(&queued), scraper, request());
        assert_eq!(runner.store().get(queued_id).unwrap().status, JobStatus::Pending);

        queued.cancel();
        wait_for_status(runner.store(), queued_id, JobStatus::Failed).await;
        assert_eq!(
            runner.store().get(queued_id).unwrap().error.unwrap().kind,
            FailureKind::Cancelled
        );

        release.notify_one();
        wait_for_status(runner.store(), blocker_id, JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn test_admission_bound_and_fifo_handoff() {
        // 3 jobs, K=1. Only job 1 processes; 2 and 3 stay
        // pending; completing job 1 starts job 2.
        let runner = test_runner(1, Duration::from_secs(30));

        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let scraper = {
            let gate = Arc::clone(&gate);
            Arc::new(FnScraper::new(move |_req, _progress, _cancel| {
                let gate = Arc::clone(&gate);
                async move {
                    let permit = gate.acquire().await.map_err(|_| ScrapeError::Cancelled)?;
                    permit.forget();
                    Ok(artifact())
                }
            }))
        };

        let jobs: Vec<_> = (0..3).map(|_| runner.store().create()).collect();
        let ids: Vec<_> = jobs.iter().map(|j| j.id()).collect();
        for job in jobs {
            runner.spawn(job, Arc::clone(&scraper) as Arc<dyn Scraper>, request());
            // Let each task reach the admission queue so arrival order is
            // the submission order.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        wait_for_status(runner.store(), ids[0], JobStatus::Processing).await;
        let snap2 = runner.store().get(ids[1]).unwrap();
        let snap3 = runner.store().get(ids[2]).unwrap();
        assert_eq!(snap2.status, JobStatus::Pending);
        assert_eq!(snap3.status, JobStatus::Pending);
        // Queued jobs expose no progress fields.
        assert_eq!(snap2.processed_count, 0);
        assert_eq!(snap2.total_count, None);

        // Let job 1 finish; job 2 must start automatically.
        gate.add_permits(1);
        wait_for_status(runner.store(), ids[0], JobStatus::Completed).await;
        wait_for_status(runner.store(), ids[1], JobStatus::Processing).await;
        assert_eq!(runner.store().get(ids[2]).unwrap().status, JobStatus::Pending);

        gate.add_permits(2);
        wait_for_status(runner.store(), ids[1], JobStatus::Completed).await;
        wait_for_status(runner.store(), ids[2], JobStatus::Completed).await;
    }
}
