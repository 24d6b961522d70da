// Boundary operations of the analysis pipeline
//
// Wires the stores, the analysis client and the processor together and
// exposes submission, status, listing and reprocessing to the HTTP layer.

use crate::analysis_client::{AnalysisClient, ArchiveUpload};
use crate::db::store::{JobStore, ReportStore};
use crate::errors::{DatabaseError, ResyncError, SubmissionError};
use crate::ingestion::ReportIngestor;
use crate::models::{AnalysisJob, JobSummary};
use crate::poller::{PollerConfig, StatusPoller};
use crate::processor::JobProcessor;
use crate::resync::{JobSynchronizer, ResyncOutcome};
use crate::telemetry;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Archive extension accepted for submission
pub const ARCHIVE_EXTENSION: &str = ".zip";

pub struct AnalysisService {
    job_store: Arc<dyn JobStore>,
    client: Arc<dyn AnalysisClient>,
    processor: Arc<JobProcessor>,
    synchronizer: JobSynchronizer,
    max_upload_bytes: u64,
}

impl AnalysisService {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        report_store: Arc<dyn ReportStore>,
        client: Arc<dyn AnalysisClient>,
        max_upload_bytes: u64,
    ) -> Self {
        let processor = Arc::new(JobProcessor::new(
            Arc::clone(&job_store),
            report_store,
            ReportIngestor::new(),
        ));
        let synchronizer = JobSynchronizer::new(
            Arc::clone(&job_store),
            Arc::clone(&client),
            Arc::clone(&processor),
        );

        Self {
            job_store,
            client,
            processor,
            synchronizer,
            max_upload_bytes,
        }
    }

    /// A status poller sharing this service's collaborators
    pub fn status_poller(&self, config: PollerConfig) -> StatusPoller {
        StatusPoller::new(
            config,
            Arc::clone(&self.job_store),
            Arc::clone(&self.client),
            Arc::clone(&self.processor),
        )
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Check the upload before anything is sent upstream
    pub fn validate_upload(&self, file_name: &str, job_name: &str, length: u64) -> Result<(), SubmissionError> {
        if job_name.trim().is_empty() {
            return Err(SubmissionError::InvalidUpload("a job name is required".to_string()));
        }
        if !file_name.to_lowercase().ends_with(ARCHIVE_EXTENSION) {
            return Err(SubmissionError::InvalidUpload(format!(
                "only {} archives are accepted",
                ARCHIVE_EXTENSION
            )));
        }
        if length == 0 {
            return Err(SubmissionError::InvalidUpload("the archive is empty".to_string()));
        }
        if length > self.max_upload_bytes {
            return Err(SubmissionError::InvalidUpload(format!(
                "the archive exceeds the {} byte limit",
                self.max_upload_bytes
            )));
        }
        Ok(())
    }

    /// Submit an archive and record a pending job for it
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, job_name = %upload.job_name))]
    pub async fn start_analysis(&self, upload: ArchiveUpload) -> Result<Uuid, SubmissionError> {
        self.validate_upload(&upload.file_name, &upload.job_name, upload.length)?;

        let job_name = upload.job_name.trim().to_string();
        let batch_id = self.client.submit(upload).await?;

        let job = AnalysisJob::new(job_name, batch_id);
        self.job_store.create(&job).await?;
        telemetry::record_job_submitted();

        tracing::info!(job_id = %job.id, batch_id = %job.external_batch_id, "Analysis job submitted");
        Ok(job.id)
    }

    #[instrument(skip(self))]
    pub async fn get_job_status(&self, job_id: Uuid) -> Result<Option<JobSummary>, DatabaseError> {
        Ok(self
            .job_store
            .find_by_id(job_id)
            .await?
            .map(|job| job.summary()))
    }

    /// Every job, newest first
    #[instrument(skip(self))]
    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>, DatabaseError> {
        Ok(self
            .job_store
            .list_all()
            .await?
            .iter()
            .map(AnalysisJob::summary)
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn reprocess_job(&self, job_id: Uuid) -> Result<ResyncOutcome, ResyncError> {
        self.synchronizer.resync(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis_client::MockAnalysisClient;
    use crate::db::memory::{InMemoryJobStore, InMemoryReportStore};
    use crate::errors::AnalysisClientError;
    use crate::models::JobStatus;
    use std::io::Write;

    fn service(client: MockAnalysisClient) -> AnalysisService {
        AnalysisService::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemoryReportStore::new()),
            Arc::new(client),
            1024,
        )
    }

    async fn upload(file_name: &str, job_name: &str, bytes: &[u8]) -> ArchiveUpload {
        let mut temp = tempfile::tempfile().unwrap();
        temp.write_all(bytes).unwrap();
        ArchiveUpload {
            file_name: file_name.to_string(),
            job_name: job_name.to_string(),
            file: tokio::fs::File::from_std(temp),
            length: bytes.len() as u64,
        }
    }

    #[tokio::test]
    async fn test_start_analysis_creates_pending_job() {
        let mut client = MockAnalysisClient::new();
        client
            .expect_submit()
            .times(1)
            .returning(|_| Ok("abc123".to_string()));
        let service = service(client);

        let job_id = service
            .start_analysis(upload("chats.ZIP", " May export ", b"PK").await)
            .await
            .unwrap();

        let summary = service.get_job_status(job_id).await.unwrap().unwrap();
        assert_eq!(summary.status, JobStatus::Pending);
        assert_eq!(summary.name, "May export");
        assert_eq!(service.list_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_uploads_never_reach_the_service() {
        let mut client = MockAnalysisClient::new();
        client.expect_submit().times(0);
        let service = service(client);

        for (file, name, bytes) in [
            ("chats.tar.gz", "export", &b"data"[..]),
            ("chats.zip", "   ", &b"data"[..]),
            ("chats.zip", "export", &b""[..]),
            ("chats.zip", "export", &[0u8; 2048][..]),
        ] {
            let err = service
                .start_analysis(upload(file, name, bytes).await)
                .await
                .unwrap_err();
            assert!(matches!(err, SubmissionError::InvalidUpload(_)), "{}", file);
        }
        assert!(service.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_submission_creates_no_job() {
        let mut client = MockAnalysisClient::new();
        client.expect_submit().returning(|_| {
            Err(AnalysisClientError::ServiceUnavailable("refused".to_string()))
        });
        let service = service(client);

        let err = service
            .start_analysis(upload("chats.zip", "export", b"PK").await)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Upstream(_)));
        assert!(service.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_status_is_none() {
        let service = service(MockAnalysisClient::new());
        assert!(service.get_job_status(Uuid::new_v4()).await.unwrap().is_none());
    }
}
