// crates/core/src/scrape.rs
//! Seam to the external scrape-and-build routine.
//!
//! The orchestration core never drives a browser itself; it invokes a
//! [`Scraper`] with the job's input, a progress sink, and a cancellation
//! token, and receives either an artifact reference or a [`ScrapeError`].

pub mod command;

use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ScrapeError;
use crate::job::ArtifactRef;
use crate::progress::ProgressSink;

/// Input for one scrape run.
///
/// The roster CSV is an opaque payload to the core; only the automation
/// routine interprets it.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    /// Spooled copy of the uploaded roster CSV.
    pub roster_path: PathBuf,
    /// Results portal URL the automation should drive.
    pub portal_url: String,
    /// Optional subject-code filter, already normalized (trimmed, uppercase).
    pub subject_codes: Vec<String>,
    /// Where the routine should write the generated spreadsheet.
    pub output_path: PathBuf,
}

/// The external scrape-and-build routine.
///
/// Implementations must watch `cancel` and stop promptly when it fires;
/// the runner will not leave a routine driving a browser unattended.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn run(
        &self,
        request: &ScrapeRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<ArtifactRef, ScrapeError>;
}

/// Adapter turning an async closure into a [`Scraper`]. Used heavily by
/// tests to script scraper behavior.
pub struct FnScraper<F> {
    f: F,
}

impl<F, Fut> FnScraper<F>
where
    F: Fn(ScrapeRequest, ProgressSink, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ArtifactRef, ScrapeError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Scraper for FnScraper<F>
where
    F: Fn(ScrapeRequest, ProgressSink, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ArtifactRef, ScrapeError>> + Send,
{
    async fn run(
        &self,
        request: &ScrapeRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<ArtifactRef, ScrapeError> {
        (self.f)(request.clone(), progress, cancel).await
    }
}

/// Guess a download content type from the artifact's extension.
pub(crate) fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("csv") => "text/csv",
        _ => "application/octet-stream",
    }
}
