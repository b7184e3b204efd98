// crates/server/src/config.rs
//! Environment-based server configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default port for the server.
const DEFAULT_PORT: u16 = 8370;
/// Default concurrent worker budget (simultaneous browser instances).
const DEFAULT_WORKERS: usize = 2;
/// Default lifetime ceiling for a single job.
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 1800;
/// Default retention window before a job record is evicted.
const DEFAULT_JOB_TTL_SECS: u64 = 3600;
/// Default interval between eviction sweeps.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Admission budget `K`: how many scrape runs may drive browsers at once.
    pub workers: usize,
    /// Server-side backstop: jobs processing past this are force-failed.
    pub job_timeout: Duration,
    /// Retention window past `updated_at` before a record is evicted.
    pub retention: Duration,
    pub sweep_interval: Duration,
    /// Directory for spooled roster uploads and generated artifacts.
    pub spool_dir: PathBuf,
    /// Command line for the external automation routine.
    pub scraper_command: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_var("MARKBOOK_PORT")
                .or_else(|| env_var("PORT"))
                .unwrap_or(DEFAULT_PORT),
            workers: env_var("MARKBOOK_WORKERS").unwrap_or(DEFAULT_WORKERS),
            job_timeout: Duration::from_secs(
                env_var("MARKBOOK_JOB_TIMEOUT_SECS").unwrap_or(DEFAULT_JOB_TIMEOUT_SECS),
            ),
            retention: Duration::from_secs(
                env_var("MARKBOOK_JOB_TTL_SECS").unwrap_or(DEFAULT_JOB_TTL_SECS),
            ),
            sweep_interval: Duration::from_secs(
                env_var("MARKBOOK_SWEEP_INTERVAL_SECS").unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
            ),
            spool_dir: std::env::var("MARKBOOK_SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("markbook")),
            scraper_command: std::env::var("MARKBOOK_SCRAPER_CMD")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            workers: DEFAULT_WORKERS,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            retention: Duration::from_secs(DEFAULT_JOB_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            spool_dir: std::env::temp_dir().join("markbook"),
            scraper_command: None,
        }
    }
}

fn env_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
