// crates/server/src/routes/jobs.rs
//! API routes for job submission, polling, and artifact download.
//!
//! - POST /api/jobs: submit a roster + portal URL, returns a job id
//! - GET  /api/jobs: list all live jobs
//! - GET  /api/jobs/{id}: poll one job's status
//! - GET  /api/jobs/{id}/download: fetch the generated spreadsheet

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use markbook_core::{JobError, JobId, JobSnapshot, JobStatus, ScrapeRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Response for a successful submission.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub message: String,
}

/// Read-only projection of a job record for polling clients.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub processed_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    /// Only present once the total is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    pub file_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl From<&JobSnapshot> for JobStatusResponse {
    fn from(snap: &JobSnapshot) -> Self {
        Self {
            job_id: snap.id,
            status: snap.status,
            processed_count: snap.processed_count,
            total_count: snap.total_count,
            progress_percentage: snap.progress_percentage(),
            current_item: snap.current_item.clone(),
            file_ready: snap.artifact.is_some(),
            error: snap.error.clone(),
        }
    }
}

/// The three submission fields, pulled out of the multipart body.
#[derive(Default)]
struct SubmissionFields {
    roster: Option<axum::body::Bytes>,
    url: Option<String>,
    subject_codes: Option<String>,
}

async fn read_submission(multipart: &mut Multipart) -> ApiResult<SubmissionFields> {
    let mut fields = SubmissionFields::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "roster" => {
                fields.roster = Some(field.bytes().await.map_err(|e| {
                    ApiError::Validation(format!("could not read roster upload: {e}"))
                })?);
            }
            "url" => {
                fields.url = Some(field.text().await.map_err(|e| {
                    ApiError::Validation(format!("could not read url field: {e}"))
                })?);
            }
            "subject_codes" => {
                fields.subject_codes = Some(field.text().await.map_err(|e| {
                    ApiError::Validation(format!("could not read subject_codes field: {e}"))
                })?);
            }
            other => {
                tracing::debug!(field = %other, "ignoring unknown submission field");
            }
        }
    }
    Ok(fields)
}

/// Normalize a subject-code filter: either comma or semicolon separated,
/// whitespace-insensitive, uppercased.
fn parse_subject_codes(raw: &str) -> Vec<String> {
    raw.replace(';', ",")
        .split(',')
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty())
        .collect()
}

/// POST /api/jobs: accept a roster CSV + portal URL, start a job.
///
/// Validation failures reject the request synchronously; no job record is
/// created for them. On success the job id comes back immediately and the
/// scrape runs concurrently with this response.
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let fields = read_submission(&mut multipart).await?;

    let roster = fields
        .roster
        .ok_or_else(|| ApiError::Validation("roster CSV file is required".to_string()))?;
    if roster.is_empty() {
        return Err(ApiError::Validation("roster CSV file is empty".to_string()));
    }

    let url = fields
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::Validation("results portal url is required".to_string()))?;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ApiError::Validation(
            "results portal url must be an http(s) URL".to_string(),
        ));
    }

    let subject_codes = parse_subject_codes(fields.subject_codes.as_deref().unwrap_or(""));

    // Spool the upload before creating the record so a spool failure never
    // leaves a job behind.
    let spool_dir = &state.config.spool_dir;
    tokio::fs::create_dir_all(spool_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("could not create spool dir: {e}")))?;
    let roster_path = spool_dir.join(format!("roster-{}.csv", Uuid::new_v4()));
    tokio::fs::write(&roster_path, &roster)
        .await
        .map_err(|e| ApiError::Internal(format!("could not spool roster upload: {e}")))?;

    let job = state.store.create();
    let job_id = job.id();
    let request = ScrapeRequest {
        roster_path,
        portal_url: url,
        subject_codes,
        output_path: spool_dir.join(format!("results-{job_id}.xlsx")),
    };

    tracing::info!(job_id = %job_id, url = %request.portal_url, "job submitted");
    state.runner.spawn(job, Arc::clone(&state.scraper), request);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            message: format!("Processing started. Poll /api/jobs/{job_id} for progress."),
        }),
    ))
}

/// GET /api/jobs/{id}: status poll.
///
/// A pure projection of the job record: O(1), never blocks behind a runner,
/// safe to poll at any rate.
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let snap = lookup(&state, &id)?;
    Ok(Json(JobStatusResponse::from(&snap)))
}

/// GET /api/jobs: list all live jobs, newest first.
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobStatusResponse>> {
    Json(
        state
            .store
            .snapshots()
            .iter()
            .map(JobStatusResponse::from)
            .collect(),
    )
}

/// GET /api/jobs/{id}/download: fetch the generated spreadsheet.
///
/// Valid only once the job completed; repeat fetches succeed until the
/// record is evicted. Anything earlier (or a failed job) is a conflict that
/// reports the current status.
pub async fn download_artifact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let snap = lookup(&state, &id)?;

    if snap.status != JobStatus::Completed {
        return Err(ApiError::NotReady {
            status: snap.status,
            error: snap.error,
        });
    }

    let artifact = snap
        .artifact
        .ok_or_else(|| ApiError::Internal(format!("completed job {id} has no artifact")))?;
    let bytes = tokio::fs::read(&artifact.path).await.map_err(|e| {
        ApiError::Internal(format!(
            "could not read artifact {}: {e}",
            artifact.path.display()
        ))
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, artifact.content_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact.file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Resolve a path id to a snapshot. Malformed, unknown, and evicted ids all
/// collapse into the same not-found error.
fn lookup(state: &AppState, raw_id: &str) -> ApiResult<JobSnapshot> {
    JobId::parse(raw_id)
        .and_then(|id| state.store.get(id))
        .ok_or_else(|| ApiError::JobNotFound(raw_id.to_string()))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/{id}", get(job_status))
        .route("/jobs/{id}/download", get(download_artifact))
}
