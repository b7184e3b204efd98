// crates/core/src/error.rs
use thiserror::Error;

use crate::job::JobId;

/// Errors returned by job store mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The job already reached `completed` or `failed`; the attempted write
    /// was rejected rather than silently overwriting the terminal outcome.
    #[error("job {id} is already in a terminal state")]
    Terminal { id: JobId },
}

/// Errors surfaced by the external scrape-and-build routine.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("automation failure: {message}")]
    Automation { message: String },

    #[error("scrape cancelled")]
    Cancelled,

    #[error("io error during scrape: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    pub fn automation(message: impl Into<String>) -> Self {
        Self::Automation {
            message: message.into(),
        }
    }
}
