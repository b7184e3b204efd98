// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use markbook_core::{AdmissionController, JobRunner, JobStore, Scraper};

use crate::config::Config;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub config: Config,
    /// Authoritative job records. Routes only ever read snapshots.
    pub store: Arc<JobStore>,
    /// Spawns and supervises one scrape run per submitted job.
    pub runner: JobRunner,
    /// The external automation routine handed to each runner.
    pub scraper: Arc<dyn Scraper>,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(config: Config, scraper: Arc<dyn Scraper>) -> Arc<Self> {
        let store = Arc::new(JobStore::new(config.retention));
        let admission = AdmissionController::new(config.workers);
        let runner = JobRunner::new(Arc::clone(&store), admission, config.job_timeout);
        Arc::new(Self {
            start_time: Instant::now(),
            config,
            store,
            runner,
            scraper,
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
