// Manual resync of a single job, triggered by an operator

use crate::analysis_client::AnalysisClient;
use crate::db::store::JobStore;
use crate::errors::ResyncError;
use crate::models::{AnalysisJob, UpstreamState};
use crate::processor::{BatchState, JobProcessor, ProcessReport};
use crate::telemetry;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Annotation left on a job when the upstream call of a manual resync fails
pub const MANUAL_SYNC_FAILED_MESSAGE: &str = "Manual sync failed; the status checker will retry.";

/// Result of a manual resync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResyncOutcome {
    pub message: String,
    /// Present when ingestion ran
    pub report: Option<ProcessReport>,
}

fn describe(report: &ProcessReport, source: &str) -> String {
    match report.state {
        BatchState::Empty => format!("{}: the result holds no tickets.", source),
        BatchState::Committed => format!(
            "{}: {} of {} tickets ingested.",
            source, report.succeeded, report.total
        ),
        BatchState::RolledBack => format!(
            "{}: the batch was rolled back and no reports were saved.",
            source
        ),
    }
}

pub struct JobSynchronizer {
    job_store: Arc<dyn JobStore>,
    client: Arc<dyn AnalysisClient>,
    processor: Arc<JobProcessor>,
}

impl JobSynchronizer {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        client: Arc<dyn AnalysisClient>,
        processor: Arc<JobProcessor>,
    ) -> Self {
        Self {
            job_store,
            client,
            processor,
        }
    }

    /// Re-run processing for one job.
    ///
    /// A completed job with a stored payload is reprocessed without calling
    /// the analysis service. Otherwise the result is fetched; upstream
    /// failures are reported to the caller instead of being retried.
    #[instrument(skip(self))]
    pub async fn resync(&self, job_id: Uuid) -> Result<ResyncOutcome, ResyncError> {
        let mut job = self
            .job_store
            .find_by_id(job_id)
            .await?
            .ok_or(ResyncError::JobNotFound(job_id))?;

        if job.has_stored_result() {
            info!(job_id = %job.id, "Reprocessing stored analysis result");
            let report = self.processor.reprocess_stored(&mut job).await?;
            return Ok(ResyncOutcome {
                message: describe(&report, "Reprocessed stored result"),
                report: Some(report),
            });
        }

        if job.external_batch_id.trim().is_empty() {
            return Err(ResyncError::InvalidState(format!(
                "job {} has no analysis batch id",
                job.id
            )));
        }

        self.fetch_and_process(&mut job).await
    }

    async fn fetch_and_process(&self, job: &mut AnalysisJob) -> Result<ResyncOutcome, ResyncError> {
        let raw = match self.client.fetch_result(&job.external_batch_id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Manual sync could not reach the analysis service");
                job.annotate(MANUAL_SYNC_FAILED_MESSAGE);
                if let Err(store_err) = self.job_store.update(job).await {
                    warn!(job_id = %job.id, error = %store_err, "Failed to annotate job");
                }
                return Err(e.into());
            }
        };

        if raw.upstream_state() != UpstreamState::Completed {
            let message = format!(
                "Analysis service status '{}'. No action was taken.",
                raw.status
            );
            job.annotate(message.clone());
            self.job_store.update(job).await?;
            return Ok(ResyncOutcome {
                message,
                report: None,
            });
        }

        job.mark_completed(raw.to_value(), Utc::now())?;
        self.job_store.update(job).await?;
        telemetry::record_job_completed();

        let report = self.processor.process(job, &raw).await?;
        Ok(ResyncOutcome {
            message: describe(&report, "Fetched and processed result"),
            report: Some(report),
        })
    }
}
