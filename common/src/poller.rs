// Status poller
//
// Background loop that asks the analysis service about every pending job,
// persists terminal results and hands completed ones to the job processor.

use crate::analysis_client::AnalysisClient;
use crate::config;
use crate::db::store::JobStore;
use crate::errors::{AnalysisClientError, DatabaseError, ProcessingError};
use crate::models::{AnalysisJob, RawResult, UpstreamState};
use crate::processor::JobProcessor;
use crate::telemetry;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Poller configuration
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Wait between two poll cycles
    pub poll_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
        }
    }
}

impl From<&config::SchedulerConfig> for PollerConfig {
    fn from(config: &config::SchedulerConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
        }
    }
}

/// What one check did to a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not terminal upstream yet, or the service could not be reached
    StillPending,
    Completed,
    Failed,
    /// Another writer updated the job first
    Skipped,
}

/// Counts from one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub checked: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct StatusPoller {
    config: PollerConfig,
    job_store: Arc<dyn JobStore>,
    client: Arc<dyn AnalysisClient>,
    processor: Arc<JobProcessor>,
    shutdown_tx: watch::Sender<bool>,
}

impl StatusPoller {
    pub fn new(
        config: PollerConfig,
        job_store: Arc<dyn JobStore>,
        client: Arc<dyn AnalysisClient>,
        processor: Arc<JobProcessor>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        Self {
            config,
            job_store,
            client,
            processor,
            shutdown_tx,
        }
    }

    fn is_stopping(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Run poll cycles until `stop` is called.
    ///
    /// A stop request interrupts the sleep between cycles. A cycle that is
    /// already running finishes its current job first.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!(
            poll_interval_seconds = self.config.poll_interval.as_secs(),
            "Starting status poller"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                _ = sleep(self.config.poll_interval) => {
                    let started = Instant::now();
                    match self.poll_once().await {
                        Ok(summary) if summary.checked > 0 => {
                            info!(
                                checked = summary.checked,
                                completed = summary.completed,
                                failed = summary.failed,
                                "Poll cycle finished"
                            );
                        }
                        Ok(_) => debug!("No pending analysis jobs"),
                        Err(e) => error!(error = %e, "Failed to load pending analysis jobs"),
                    }
                    telemetry::record_poll_duration(started.elapsed().as_secs_f64());
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping status poller");
                        break;
                    }
                }
            }
        }

        info!("Status poller stopped");
    }

    /// Ask the loop to exit
    #[instrument(skip(self))]
    pub fn stop(&self) {
        info!("Stopping status poller");
        self.shutdown_tx.send_replace(true);
    }

    /// Check every pending job once, sequentially
    #[instrument(skip(self))]
    pub async fn poll_once(&self) -> Result<PollSummary, DatabaseError> {
        let pending = self.job_store.find_pending().await?;
        telemetry::update_pending_jobs(pending.len());
        debug!(pending = pending.len(), "Poll cycle started");

        let mut summary = PollSummary::default();
        for job in pending {
            if self.is_stopping() {
                info!("Stop requested, leaving remaining jobs for the next run");
                break;
            }

            let job_id = job.id;
            summary.checked += 1;
            match self.check_job(job).await {
                Ok(PollOutcome::Completed) => summary.completed += 1,
                Ok(PollOutcome::Failed) => summary.failed += 1,
                Ok(_) => {}
                Err(e) => error!(job_id = %job_id, error = %e, "Failed to record job state"),
            }
        }

        Ok(summary)
    }

    /// Fetch and apply the upstream state of one job
    #[instrument(skip(self, job), fields(job_id = %job.id, batch_id = %job.external_batch_id))]
    pub async fn check_job(&self, job: AnalysisJob) -> Result<PollOutcome, DatabaseError> {
        let raw = match self.client.fetch_result(&job.external_batch_id).await {
            Ok(raw) => raw,
            Err(e @ AnalysisClientError::ServiceUnavailable(_)) => {
                warn!(job_id = %job.id, error = %e, "Analysis service unreachable, will retry");
                return Ok(PollOutcome::StillPending);
            }
            Err(e @ AnalysisClientError::UpstreamError { .. }) => {
                warn!(job_id = %job.id, error = %e, "Analysis service rejected status check, will retry");
                return Ok(PollOutcome::StillPending);
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Unexpected error while checking job");
                let message = format!("Critical error while checking job: {}", e);
                return self.fail_job(job, message, None, "check_error").await;
            }
        };

        match raw.upstream_state() {
            UpstreamState::Completed => self.complete_job(job, raw).await,
            state @ (UpstreamState::Failed | UpstreamState::Cancelled) => {
                let message = raw
                    .errors
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| format!("Analysis service reported status '{}'", raw.status));
                let reason = if state == UpstreamState::Cancelled {
                    "upstream_cancelled"
                } else {
                    "upstream_failed"
                };
                warn!(job_id = %job.id, status = %raw.status, "Analysis ended without results");
                self.fail_job(job, message, Some(raw.to_value()), reason).await
            }
            UpstreamState::InProgress(status) => {
                debug!(job_id = %job.id, status = %status, "Analysis still running");
                Ok(PollOutcome::StillPending)
            }
        }
    }

    async fn complete_job(
        &self,
        mut job: AnalysisJob,
        raw: RawResult,
    ) -> Result<PollOutcome, DatabaseError> {
        if let Err(e) = job.mark_completed(raw.to_value(), Utc::now()) {
            warn!(job_id = %job.id, error = %e, "Job already completed, skipping");
            return Ok(PollOutcome::Skipped);
        }

        // The raw payload is committed before any ingestion starts
        match self.job_store.update(&mut job).await {
            Ok(()) => {}
            Err(e) if e.is_concurrency_conflict() => {
                info!(job_id = %job.id, "Job updated concurrently, skipping");
                return Ok(PollOutcome::Skipped);
            }
            Err(e) => return Err(e),
        }
        telemetry::record_job_completed();
        info!(job_id = %job.id, "Analysis result stored");

        match self.processor.process(&mut job, &raw).await {
            Ok(_) | Err(ProcessingError::Malformed(_)) => {}
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Report creation failed");
                self.annotate_latest(&job, format!("Report creation from the stored result failed: {}", e))
                    .await?;
            }
        }

        Ok(PollOutcome::Completed)
    }

    async fn fail_job(
        &self,
        mut job: AnalysisJob,
        message: String,
        raw_result: Option<serde_json::Value>,
        reason: &str,
    ) -> Result<PollOutcome, DatabaseError> {
        if let Err(e) = job.mark_failed(message, raw_result, Utc::now()) {
            warn!(job_id = %job.id, error = %e, "Job already completed, not marking failed");
            return Ok(PollOutcome::Skipped);
        }

        match self.job_store.update(&mut job).await {
            Ok(()) => {
                telemetry::record_job_failed(reason);
                Ok(PollOutcome::Failed)
            }
            Err(e) if e.is_concurrency_conflict() => {
                info!(job_id = %job.id, "Job updated concurrently, skipping");
                Ok(PollOutcome::Skipped)
            }
            Err(e) => Err(e),
        }
    }

    /// Record an error on the freshest copy of the job; status is untouched
    async fn annotate_latest(&self, job: &AnalysisJob, message: String) -> Result<(), DatabaseError> {
        let Some(mut latest) = self.job_store.find_by_id(job.id).await? else {
            return Ok(());
        };
        latest.annotate(message);
        self.job_store.update(&mut latest).await
    }
}
