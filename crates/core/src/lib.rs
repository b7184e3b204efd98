// crates/core/src/lib.rs
//! Job orchestration core for the markbook result scraper.
//!
//! Decouples submission of a long-running scrape from its completion:
//! a client submits work, gets an opaque job id back immediately, polls the
//! job's status, and eventually fetches the produced spreadsheet.
//!
//! - [`store::JobStore`]: in-memory source of truth for job records
//! - [`admission::AdmissionController`]: bounds concurrent browser work
//! - [`runner::JobRunner`]: supervises one scrape run per job
//! - [`scrape::Scraper`]: the seam to the external automation routine

pub mod admission;
pub mod error;
pub mod job;
pub mod progress;
pub mod runner;
pub mod scrape;
pub mod store;

pub use admission::AdmissionController;
pub use error::{ScrapeError, StoreError};
pub use job::{ArtifactRef, FailureKind, JobError, JobId, JobSnapshot, JobStatus};
pub use progress::{ProgressSink, ProgressUpdate};
pub use runner::JobRunner;
pub use scrape::{command::CommandScraper, FnScraper, ScrapeRequest, Scraper};
pub use store::{JobState, JobStore};
