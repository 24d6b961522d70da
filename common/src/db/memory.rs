// In-memory stores
//
// Same contracts as the Postgres repositories. Used by the test suites and
// for running the pipeline without a database.

use crate::db::store::{JobStore, ReportStore, ReportTransaction};
use crate::errors::DatabaseError;
use crate::models::{AnalysisJob, Report, Requester};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Job store backed by a map, with the same conditional-update rules as
/// `PgJobStore`
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, AnalysisJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &AnalysisJob) -> Result<(), DatabaseError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(DatabaseError::DuplicateKey(format!(
                "Analysis job already exists: {}",
                job.id
            )));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AnalysisJob>, DatabaseError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn find_pending(&self) -> Result<Vec<AnalysisJob>, DatabaseError> {
        let mut pending: Vec<AnalysisJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| !job.is_terminal())
            .cloned()
            .collect();
        pending.sort_by_key(|job| job.created_at);
        Ok(pending)
    }

    async fn list_all(&self) -> Result<Vec<AnalysisJob>, DatabaseError> {
        let mut all: Vec<AnalysisJob> = self.jobs.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn update(&self, job: &mut AnalysisJob) -> Result<(), DatabaseError> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .get_mut(&job.id)
            .ok_or_else(|| DatabaseError::NotFound(format!("Analysis job not found: {}", job.id)))?;

        if stored.version != job.version {
            return Err(DatabaseError::ConcurrencyConflict {
                job_id: job.id,
                expected_version: job.version,
            });
        }

        stored.status = job.status;
        if stored.completed_at.is_none() {
            stored.completed_at = job.completed_at;
        }
        if job.raw_result.is_some() {
            stored.raw_result = job.raw_result.clone();
        }
        stored.error_message = job.error_message.clone();
        stored.version += 1;

        job.version = stored.version;
        job.completed_at = stored.completed_at;
        job.raw_result = stored.raw_result.clone();
        Ok(())
    }
}

#[derive(Default)]
struct ReportState {
    requesters: Vec<Requester>,
    reports: Vec<Report>,
    fail_next_commit: bool,
    fail_after_inserts: Option<usize>,
    rejected_emails: Vec<String>,
}

fn same_email(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Report store holding committed rows in memory.
///
/// Fault injection hooks apply to the next transaction opened with `begin`.
#[derive(Clone, Default)]
pub struct InMemoryReportStore {
    state: Arc<Mutex<ReportState>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed reports
    pub async fn reports(&self) -> Vec<Report> {
        self.state.lock().await.reports.clone()
    }

    /// Committed requesters
    pub async fn requesters(&self) -> Vec<Requester> {
        self.state.lock().await.requesters.clone()
    }

    /// Make the next transaction's commit fail, applying nothing
    pub async fn fail_next_commit(&self) {
        self.state.lock().await.fail_next_commit = true;
    }

    /// Make the next transaction fault once `count` reports are staged.
    ///
    /// The fault surfaces when the following savepoint is opened, i.e. as a
    /// transaction-level failure rather than a per-ticket one.
    pub async fn fail_after_inserts(&self, count: usize) {
        self.state.lock().await.fail_after_inserts = Some(count);
    }

    /// Reject inserts of a requester with this email as a duplicate key
    pub async fn reject_requester_email(&self, email: impl Into<String>) {
        self.state.lock().await.rejected_emails.push(email.into());
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn begin(&self) -> Result<Box<dyn ReportTransaction>, DatabaseError> {
        let mut state = self.state.lock().await;
        let fail_commit = std::mem::take(&mut state.fail_next_commit);
        let fail_after_inserts = state.fail_after_inserts.take();

        Ok(Box::new(InMemoryReportTransaction {
            state: Arc::clone(&self.state),
            staged_requesters: Vec::new(),
            staged_reports: Vec::new(),
            savepoint: None,
            fail_commit,
            fail_after_inserts,
        }))
    }
}

/// Staging buffers for one in-memory transaction
pub struct InMemoryReportTransaction {
    state: Arc<Mutex<ReportState>>,
    staged_requesters: Vec<Requester>,
    staged_reports: Vec<Report>,
    savepoint: Option<(usize, usize)>,
    fail_commit: bool,
    fail_after_inserts: Option<usize>,
}

#[async_trait]
impl ReportTransaction for InMemoryReportTransaction {
    async fn find_requester_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<Requester>, DatabaseError> {
        if let Some(staged) = self
            .staged_requesters
            .iter()
            .find(|r| same_email(&r.email, email))
        {
            return Ok(Some(staged.clone()));
        }

        let state = self.state.lock().await;
        Ok(state
            .requesters
            .iter()
            .find(|r| same_email(&r.email, email))
            .cloned())
    }

    async fn insert_requester(&mut self, requester: &Requester) -> Result<(), DatabaseError> {
        let state = self.state.lock().await;
        let duplicate = state
            .rejected_emails
            .iter()
            .any(|e| same_email(e, &requester.email))
            || state
                .requesters
                .iter()
                .chain(self.staged_requesters.iter())
                .any(|r| same_email(&r.email, &requester.email));
        drop(state);

        if duplicate {
            return Err(DatabaseError::DuplicateKey(format!(
                "requester email already exists: {}",
                requester.email
            )));
        }

        self.staged_requesters.push(requester.clone());
        Ok(())
    }

    async fn insert_report(&mut self, report: &Report) -> Result<(), DatabaseError> {
        let staged = self
            .staged_requesters
            .iter()
            .any(|r| r.id == report.requester_id);
        let committed = staged
            || self
                .state
                .lock()
                .await
                .requesters
                .iter()
                .any(|r| r.id == report.requester_id);

        if !committed {
            return Err(DatabaseError::ForeignKeyViolation(format!(
                "requester {} does not exist",
                report.requester_id
            )));
        }

        self.staged_reports.push(report.clone());
        Ok(())
    }

    async fn savepoint(&mut self) -> Result<(), DatabaseError> {
        if let Some(limit) = self.fail_after_inserts {
            if self.staged_reports.len() >= limit {
                return Err(DatabaseError::TransactionFailed(format!(
                    "injected fault after {} inserts",
                    limit
                )));
            }
        }

        self.savepoint = Some((self.staged_requesters.len(), self.staged_reports.len()));
        Ok(())
    }

    async fn release_savepoint(&mut self) -> Result<(), DatabaseError> {
        self.savepoint
            .take()
            .map(|_| ())
            .ok_or_else(|| DatabaseError::TransactionFailed("no active savepoint".to_string()))
    }

    async fn rollback_to_savepoint(&mut self) -> Result<(), DatabaseError> {
        let (requesters, reports) = self
            .savepoint
            .take()
            .ok_or_else(|| DatabaseError::TransactionFailed("no active savepoint".to_string()))?;
        self.staged_requesters.truncate(requesters);
        self.staged_reports.truncate(reports);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        if self.fail_commit {
            return Err(DatabaseError::TransactionFailed(
                "injected commit failure".to_string(),
            ));
        }

        let this = *self;
        let mut state = this.state.lock().await;
        state.requesters.extend(this.staged_requesters);
        state.reports.extend(this.staged_reports);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        Ok(())
    }
}
