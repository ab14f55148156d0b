//! Execution of one claimed scrape job
//!
//! ```text
//! received ─┬─▶ discarded (other platform)
//!           ├─▶ not claimed (missing, or no longer queued)
//!           └─▶ running ─┬─▶ finished
//!                        ├─▶ failed
//!                        └─▶ stopped (operator; no terminal write)
//! ```
//!
//! The job status is re-read before every step, so an operator stop is
//! honoured at the next step. Terminal writes only apply to `running` jobs.

use std::sync::Arc;

use sqlx::SqlitePool;
use taspa_common::db::{directions, entities, jobs, JobStatus};
use taspa_common::events::{JobAnnouncement, LogEvent};
use taspa_common::Platform;
use tracing::{debug, error, info, warn};

use crate::clients::{ConfigSource, ProgressSink};

/// Emit a "sources processed" event every this many sources
pub const PROGRESS_EVERY: usize = 10;

/// What happened to one announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Announcement for another platform
    Discarded,
    /// Job missing or not `queued` any more
    NotClaimed,
    Finished,
    Failed,
    /// Operator stopped the job while it ran
    Stopped,
}

enum RunEnd {
    Completed,
    Stopped,
}

pub struct JobRunner {
    db: SqlitePool,
    platform: Platform,
    progress: Arc<dyn ProgressSink>,
    config: Arc<dyn ConfigSource>,
}

impl JobRunner {
    pub fn new(
        db: SqlitePool,
        platform: Platform,
        progress: Arc<dyn ProgressSink>,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        Self { db, platform, progress, config }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Process one announcement to completion
    pub async fn handle(&self, announcement: &JobAnnouncement) -> Outcome {
        if announcement.service_name != self.platform.as_str() {
            debug!(
                job_id = announcement.job_id,
                service_name = %announcement.service_name,
                "Discarding announcement for another platform"
            );
            return Outcome::Discarded;
        }

        let job_id = announcement.job_id;
        match jobs::claim_job(&self.db, job_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(job_id, "Job missing or no longer queued, skipping");
                return Outcome::NotClaimed;
            }
            Err(e) => {
                error!(job_id, "Failed to claim job: {}", e);
                return Outcome::NotClaimed;
            }
        }
        info!(job_id, platform = %self.platform, "Job claimed");

        match self.run(job_id, announcement.direction_id).await {
            Ok(RunEnd::Completed) => {
                self.send(LogEvent::info(job_id, self.message("scrape finished"))).await;
                self.finish(job_id, JobStatus::Finished).await
            }
            Ok(RunEnd::Stopped) => {
                info!(job_id, "Job stopped by operator, abandoning");
                self.send(LogEvent::info(job_id, self.message("scrape stopped"))).await;
                Outcome::Stopped
            }
            Err(e) => {
                self.send(LogEvent::error(job_id, self.message(&format!("scrape failed: {}", e))))
                    .await;
                self.finish(job_id, JobStatus::Failed).await
            }
        }
    }

    /// Mark a job failed after its processing aborted abnormally
    pub async fn abort(&self, job_id: i64, reason: &str) {
        self.send(LogEvent::error(job_id, self.message(&format!("scrape failed: {}", reason))))
            .await;
        self.finish(job_id, JobStatus::Failed).await;
    }

    async fn run(&self, job_id: i64, direction_id: i64) -> taspa_common::Result<RunEnd> {
        self.send(LogEvent::info(job_id, self.message("scrape started"))).await;

        if self.stop_requested(job_id).await? {
            return Ok(RunEnd::Stopped);
        }
        if let Some(config) = self.config.fetch(self.platform).await {
            let message = format!(
                "config loaded: proxies={}, rpm={}, concurrency={}",
                config.proxies.len(),
                display_opt(config.requests_per_min),
                display_opt(config.concurrency),
            );
            self.send(LogEvent::info(job_id, self.message(&message))).await;
        }

        if self.stop_requested(job_id).await? {
            return Ok(RunEnd::Stopped);
        }
        let sources =
            directions::load_sources(&self.db, direction_id, self.platform.source_type()).await?;
        let message = format!("sources loaded: {}", sources.len());
        self.send(LogEvent::info(job_id, self.message(&message))).await;

        let total = sources.len();
        for (index, source) in sources.iter().enumerate() {
            if self.stop_requested(job_id).await? {
                return Ok(RunEnd::Stopped);
            }

            entities::register_parent(&self.db, self.platform, direction_id, source).await?;

            let processed = index + 1;
            if processed % PROGRESS_EVERY == 0 || processed == total {
                let message = format!("sources processed: {}", processed);
                self.send(LogEvent::info(job_id, self.message(&message))).await;
            }
        }

        if self.stop_requested(job_id).await? {
            return Ok(RunEnd::Stopped);
        }
        Ok(RunEnd::Completed)
    }

    async fn stop_requested(&self, job_id: i64) -> taspa_common::Result<bool> {
        Ok(jobs::job_status(&self.db, job_id).await? == Some(JobStatus::Stopped))
    }

    async fn finish(&self, job_id: i64, status: JobStatus) -> Outcome {
        match jobs::complete_job(&self.db, job_id, status).await {
            Ok(true) => info!(job_id, status = %status, "Job completed"),
            Ok(false) => warn!(
                job_id,
                status = %status,
                "Job left running state, terminal write skipped"
            ),
            Err(e) => error!(job_id, status = %status, "Failed to record job outcome: {}", e),
        }

        if status == JobStatus::Finished {
            Outcome::Finished
        } else {
            Outcome::Failed
        }
    }

    async fn send(&self, event: LogEvent) {
        self.progress.send(event).await;
    }

    fn message(&self, text: &str) -> String {
        format!("{} {}", self.platform.display_name(), text)
    }
}

fn display_opt(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "None".to_string())
}
