// crates/core/src/scrape/command.rs
//! Subprocess-backed scraper.
//!
//! The automation routine (headless browser, captcha solving, spreadsheet
//! build) runs as an external command. The contract is narrow: the command
//! receives the roster path, portal URL, subject codes, and output path as
//! arguments, emits one JSON progress event per stdout line, writes the
//! artifact to the output path, and exits zero on success. Anything on
//! stdout that is not a progress event is ignored.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ScrapeError;
use crate::job::ArtifactRef;
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::scrape::{content_type_for, ScrapeRequest, Scraper};

/// One progress event on the child's stdout.
#[derive(Debug, Deserialize)]
struct ProgressEvent {
    processed: u64,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    current: Option<String>,
}

/// Runs the automation routine as a child process.
pub struct CommandScraper {
    program: String,
    base_args: Vec<String>,
}

impl CommandScraper {
    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    /// Parse a whitespace-separated command line, e.g. from configuration.
    /// Returns `None` for an empty string.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            base_args: parts.collect(),
        })
    }
}

#[async_trait]
impl Scraper for CommandScraper {
    async fn run(
        &self,
        request: &ScrapeRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<ArtifactRef, ScrapeError> {
        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .arg("--roster")
            .arg(&request.roster_path)
            .arg("--url")
            .arg(&request.portal_url)
            .arg("--codes")
            .arg(request.subject_codes.join(","))
            .arg("--output")
            .arg(&request.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScrapeError::automation("scraper stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ScrapeError::automation("scraper stderr was not captured"))?;

        // Drain stderr concurrently so a chatty child never blocks on a full
        // pipe; the tail goes into the failure message if the run fails.
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(error = %e, "failed to kill cancelled scraper process");
                    }
                    let _ = child.wait().await;
                    return Err(ScrapeError::Cancelled);
                }
                line = lines.next_line() => match line? {
                    Some(line) => match serde_json::from_str::<ProgressEvent>(&line) {
                        Ok(event) => {
                            let mut update = ProgressUpdate::new(event.processed, event.total);
                            update.current_item = event.current;
                            progress(update);
                        }
                        Err(_) => {
                            tracing::debug!(line = %line, "ignoring non-progress scraper output");
                        }
                    },
                    None => break,
                },
            }
        }

        let status = child.wait().await?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let detail = last_lines(&stderr_tail, 5);
            let message = if detail.is_empty() {
                format!("scraper exited with {status}")
            } else {
                format!("scraper exited with {status}: {detail}")
            };
            return Err(ScrapeError::automation(message));
        }

        if tokio::fs::metadata(&request.output_path).await.is_err() {
            return Err(ScrapeError::automation(
                "scraper exited successfully but produced no output file",
            ));
        }

        let file_name = request
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results.xlsx".to_string());
        Ok(ArtifactRef {
            content_type: content_type_for(&request.output_path).to_string(),
            path: request.output_path.clone(),
            file_name,
        })
    }
}

/// Last `n` non-empty lines of `text`, joined for a compact error message.
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join(" | ")
}
