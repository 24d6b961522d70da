// Job processor
//
// Ingests every ticket of a completed job inside one transaction. Per-ticket
// failures are counted and skipped; a transaction-level fault rolls the
// whole batch back. The job row is written last on every path.

use crate::db::store::{JobStore, ReportStore, ReportTransaction};
use crate::errors::{DatabaseError, ProcessingError};
use crate::ingestion::ReportIngestor;
use crate::models::{AnalysisJob, NormalizedTicket, RawResult};
use crate::parser;
use crate::telemetry;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Error summary set on a job whose batch was rolled back
pub const BATCH_FAILURE_MESSAGE: &str =
    "Batch ingestion failed; no reports were saved. Check the logs for details.";

/// Final state of one processor invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// The result held no tickets; no transaction was opened
    Empty,
    Committed,
    RolledBack,
}

/// Counts from one processor invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub state: BatchState,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ProcessReport {
    fn empty() -> Self {
        Self {
            state: BatchState::Empty,
            total: 0,
            succeeded: 0,
            failed: 0,
        }
    }
}

/// Summary recorded on a job when some tickets were rejected
pub fn failure_summary(failed: usize, total: usize) -> Option<String> {
    (failed > 0).then(|| format!("{} failures out of {}", failed, total))
}

pub struct JobProcessor {
    job_store: Arc<dyn JobStore>,
    report_store: Arc<dyn ReportStore>,
    ingestor: ReportIngestor,
}

impl JobProcessor {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        report_store: Arc<dyn ReportStore>,
        ingestor: ReportIngestor,
    ) -> Self {
        Self {
            job_store,
            report_store,
            ingestor,
        }
    }

    /// Ingest the tickets of `raw` and record the outcome on `job`.
    ///
    /// The job's status is left as the caller set it; only its error summary
    /// changes. The job is persisted on every path, so a stale `job.version`
    /// surfaces as `ProcessingError::Store(ConcurrencyConflict)`.
    #[instrument(skip(self, job, raw), fields(job_id = %job.id, batch_id = %job.external_batch_id))]
    pub async fn process(
        &self,
        job: &mut AnalysisJob,
        raw: &RawResult,
    ) -> Result<ProcessReport, ProcessingError> {
        let tickets = match parser::parse(raw) {
            Ok(tickets) => tickets,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Analysis result could not be decoded");
                job.annotate(format!("Failed to decode analysis result: {}", e));
                self.job_store.update(job).await?;
                telemetry::record_job_failed("malformed_result");
                return Err(e.into());
            }
        };

        if tickets.is_empty() {
            tracing::info!(job_id = %job.id, "Analysis result holds no tickets");
            job.clear_error();
            self.job_store.update(job).await?;
            return Ok(ProcessReport::empty());
        }

        let total = tickets.len();
        let report = match self.ingest_batch(job.id, &tickets).await {
            Ok((succeeded, failed)) => {
                match failure_summary(failed, total) {
                    Some(summary) => job.annotate(summary),
                    None => job.clear_error(),
                }
                telemetry::record_batch_outcome(succeeded, failed);
                tracing::info!(
                    job_id = %job.id,
                    total,
                    succeeded,
                    failed,
                    "Ingestion batch committed"
                );
                ProcessReport {
                    state: BatchState::Committed,
                    total,
                    succeeded,
                    failed,
                }
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Ingestion batch rolled back");
                job.annotate(BATCH_FAILURE_MESSAGE);
                telemetry::record_batch_rollback();
                ProcessReport {
                    state: BatchState::RolledBack,
                    total,
                    succeeded: 0,
                    failed: total,
                }
            }
        };

        self.job_store.update(job).await?;
        Ok(report)
    }

    /// Re-run ingestion from the payload already stored on the job
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn reprocess_stored(
        &self,
        job: &mut AnalysisJob,
    ) -> Result<ProcessReport, ProcessingError> {
        match job.stored_result() {
            None => Err(ProcessingError::NoStoredResult(job.id)),
            Some(Ok(raw)) => self.process(job, &raw).await,
            Some(Err(e)) => {
                tracing::error!(job_id = %job.id, error = %e, "Stored result could not be decoded");
                job.annotate(format!("Failed to decode analysis result: {}", e));
                self.job_store.update(job).await?;
                Err(e.into())
            }
        }
    }

    /// Run every ticket through ingestion inside one transaction.
    ///
    /// Returns (succeeded, failed) after a successful commit. Any error
    /// returned here means nothing from this batch was kept.
    async fn ingest_batch(
        &self,
        job_id: Uuid,
        tickets: &[NormalizedTicket],
    ) -> Result<(usize, usize), DatabaseError> {
        let mut tx = self.report_store.begin().await?;
        let now = Utc::now();
        let mut succeeded = 0;
        let mut failed = 0;

        for (index, ticket) in tickets.iter().enumerate() {
            if let Err(e) = tx.savepoint().await {
                return Err(abort(tx, e).await);
            }

            match self
                .ingestor
                .ingest(tx.as_mut(), ticket, Some(job_id), now)
                .await
            {
                Ok(_) => {
                    if let Err(e) = tx.release_savepoint().await {
                        return Err(abort(tx, e).await);
                    }
                    succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %job_id,
                        ticket = index,
                        requester_email = %ticket.requester_email,
                        error = %e,
                        "Ticket rejected"
                    );
                    if let Err(e) = tx.rollback_to_savepoint().await {
                        return Err(abort(tx, e).await);
                    }
                    failed += 1;
                }
            }
        }

        tx.commit().await?;
        Ok((succeeded, failed))
    }
}

async fn abort(tx: Box<dyn ReportTransaction>, cause: DatabaseError) -> DatabaseError {
    if let Err(e) = tx.rollback().await {
        tracing::error!(error = %e, "Rollback after batch fault failed");
    }
    cause
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{InMemoryJobStore, InMemoryReportStore};
    use crate::models::JobStatus;
    use serde_json::{json, Value};

    fn ticket(email: &str) -> Value {
        json!({
            "quem_solicitou_atendimento": "Ana",
            "email_solicitante": email,
            "quem_respondeu": "Carla",
            "data_solicitacao": "2024-05-02",
            "hora_primeira_mensagem": "09:15",
            "problema_relatado": "Printer offline",
            "categoria": "Hardware",
            "tempo_primeira_resposta": "00:05:00",
            "tempo_total_atendimento": "00:30:00"
        })
    }

    fn completed(tickets: Vec<Value>) -> RawResult {
        RawResult {
            status: "completed".to_string(),
            results: Some(json!([{ "atendimentos": tickets }])),
            errors: None,
        }
    }

    async fn setup() -> (
        Arc<InMemoryJobStore>,
        InMemoryReportStore,
        JobProcessor,
        AnalysisJob,
    ) {
        let jobs = Arc::new(InMemoryJobStore::new());
        let reports = InMemoryReportStore::new();
        let processor = JobProcessor::new(
            jobs.clone(),
            Arc::new(reports.clone()),
            ReportIngestor::new(),
        );

        let mut job = AnalysisJob::new("export", "abc123");
        jobs.create(&job).await.unwrap();
        let raw = json!({"status": "completed"});
        job.mark_completed(raw, Utc::now()).unwrap();
        jobs.update(&mut job).await.unwrap();

        (jobs, reports, processor, job)
    }

    #[tokio::test]
    async fn test_all_tickets_ingested() {
        let (jobs, reports, processor, mut job) = setup().await;
        let raw = completed(vec![ticket("a@x.com"), ticket("b@x.com")]);

        let report = processor.process(&mut job, &raw).await.unwrap();
        assert_eq!(report.state, BatchState::Committed);
        assert_eq!(report.succeeded, 2);
        assert_eq!(reports.reports().await.len(), 2);

        let stored = jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert!(stored.error_message.is_none());
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_partial_failure_is_summarized() {
        let (jobs, reports, processor, mut job) = setup().await;
        let raw = completed(vec![ticket("a@x.com"), ticket(""), ticket("c@x.com")]);

        let report = processor.process(&mut job, &raw).await.unwrap();
        assert_eq!((report.succeeded, report.failed), (2, 1));
        assert_eq!(reports.reports().await.len(), 2);

        let stored = jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.error_message.as_deref(), Some("1 failures out of 3"));
    }

    #[tokio::test]
    async fn test_store_error_on_one_ticket_does_not_poison_batch() {
        let (_, reports, processor, mut job) = setup().await;
        reports.reject_requester_email("b@x.com").await;
        let raw = completed(vec![ticket("a@x.com"), ticket("b@x.com"), ticket("c@x.com")]);

        let report = processor.process(&mut job, &raw).await.unwrap();
        assert_eq!((report.succeeded, report.failed), (2, 1));
        assert_eq!(reports.requesters().await.len(), 2);
    }

    #[tokio::test]
    async fn test_fault_mid_batch_rolls_everything_back() {
        let (jobs, reports, processor, mut job) = setup().await;
        reports.fail_after_inserts(3).await;
        let raw = completed(
            (0..5)
                .map(|i| ticket(&format!("user{}@x.com", i)))
                .collect(),
        );

        let report = processor.process(&mut job, &raw).await.unwrap();
        assert_eq!(report.state, BatchState::RolledBack);
        assert!(reports.reports().await.is_empty());

        let stored = jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.error_message.as_deref(), Some(BATCH_FAILURE_MESSAGE));
        assert!(stored.raw_result.is_some());
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back() {
        let (_, reports, processor, mut job) = setup().await;
        reports.fail_next_commit().await;

        let report = processor
            .process(&mut job, &completed(vec![ticket("a@x.com")]))
            .await
            .unwrap();
        assert_eq!(report.state, BatchState::RolledBack);
        assert!(reports.reports().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_clears_error() {
        let (jobs, _, processor, mut job) = setup().await;
        job.annotate("previous failure");

        let report = processor.process(&mut job, &completed(vec![])).await.unwrap();
        assert_eq!(report.state, BatchState::Empty);
        let stored = jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_malformed_result_annotates_job() {
        let (jobs, reports, processor, mut job) = setup().await;
        let raw = RawResult {
            status: "completed".to_string(),
            results: Some(json!({"unexpected": true})),
            errors: None,
        };

        let err = processor.process(&mut job, &raw).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Malformed(_)));
        assert!(reports.reports().await.is_empty());

        let stored = jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert!(stored
            .error_message
            .unwrap()
            .starts_with("Failed to decode analysis result"));
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_stale_job_surfaces_conflict() {
        let (jobs, _, processor, job) = setup().await;
        let mut stale = job.clone();
        let mut fresh = job.clone();
        fresh.annotate("someone else");
        jobs.update(&mut fresh).await.unwrap();

        let err = processor
            .process(&mut stale, &completed(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::Store(DatabaseError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_reprocess_without_payload_fails() {
        let (_, _, processor, _) = setup().await;
        let mut pending = AnalysisJob::new("export", "zzz");
        let err = processor.reprocess_stored(&mut pending).await.unwrap_err();
        assert!(matches!(err, ProcessingError::NoStoredResult(_)));
    }

    #[test]
    fn test_failure_summary_text() {
        assert_eq!(failure_summary(0, 5), None);
        assert_eq!(failure_summary(2, 5).as_deref(), Some("2 failures out of 5"));
    }
}
