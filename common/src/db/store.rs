// Persistence seams used by the pipeline
//
// The job processor, poller and resync only see these traits; Postgres and
// in-memory implementations live next to them.

use crate::errors::DatabaseError;
use crate::models::{AnalysisJob, Report, Requester};
use async_trait::async_trait;
use uuid::Uuid;

/// Persisted analysis jobs with optimistic concurrency
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly submitted job
    async fn create(&self, job: &AnalysisJob) -> Result<(), DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AnalysisJob>, DatabaseError>;

    /// Jobs still waiting on the analysis service, oldest first
    async fn find_pending(&self) -> Result<Vec<AnalysisJob>, DatabaseError>;

    /// Every job, newest first
    async fn list_all(&self) -> Result<Vec<AnalysisJob>, DatabaseError>;

    /// Write the mutable fields of `job` if nobody else updated it since it
    /// was read.
    ///
    /// On success `job.version` is advanced to the stored token. A stale
    /// token fails with `DatabaseError::ConcurrencyConflict` and leaves the
    /// stored row untouched.
    async fn update(&self, job: &mut AnalysisJob) -> Result<(), DatabaseError>;
}

/// Opens units of work for report ingestion
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ReportTransaction>, DatabaseError>;
}

/// One open transaction spanning a whole ingestion batch.
///
/// Per-record work is bracketed by a savepoint so a failing ticket can be
/// undone without losing the records staged before it.
#[async_trait]
pub trait ReportTransaction: Send {
    /// Case-insensitive lookup, seeing rows staged earlier in this transaction
    async fn find_requester_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<Requester>, DatabaseError>;

    async fn insert_requester(&mut self, requester: &Requester) -> Result<(), DatabaseError>;

    async fn insert_report(&mut self, report: &Report) -> Result<(), DatabaseError>;

    async fn savepoint(&mut self) -> Result<(), DatabaseError>;

    async fn release_savepoint(&mut self) -> Result<(), DatabaseError>;

    async fn rollback_to_savepoint(&mut self) -> Result<(), DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}
