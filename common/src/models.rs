use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::{JobTransitionError, ParseError};

// ============================================================================
// Analysis Job Models
// ============================================================================

/// JobStatus represents where an analysis job is in its lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// AnalysisJob is the persisted lifecycle record of one submitted archive.
///
/// `version` is the optimistic-concurrency token: every store update is
/// conditioned on it and bumps it on success.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub name: String,
    pub external_batch_id: String,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub raw_result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub version: i64,
}

impl AnalysisJob {
    /// Create a pending job for a batch the analysis service accepted
    pub fn new(name: impl Into<String>, external_batch_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            external_batch_id: external_batch_id.into(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            raw_result: None,
            error_message: None,
            version: 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a manual resync can work from the stored payload alone
    pub fn has_stored_result(&self) -> bool {
        self.status == JobStatus::Completed && self.raw_result.is_some()
    }

    /// Store a completed payload and move the job to `Completed`.
    ///
    /// A job that is already completed keeps its first payload; `completed_at`
    /// is only set once.
    pub fn mark_completed(
        &mut self,
        raw_result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), JobTransitionError> {
        if self.status == JobStatus::Completed {
            return Err(self.transition_error(JobStatus::Completed));
        }

        self.status = JobStatus::Completed;
        self.raw_result = Some(raw_result);
        self.completed_at.get_or_insert(now);
        self.error_message = None;
        Ok(())
    }

    /// Move the job to `Failed`, keeping any payload that came with the failure
    pub fn mark_failed(
        &mut self,
        message: impl Into<String>,
        raw_result: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<(), JobTransitionError> {
        if self.status == JobStatus::Completed {
            return Err(self.transition_error(JobStatus::Failed));
        }

        self.status = JobStatus::Failed;
        if let Some(raw) = raw_result {
            self.raw_result = Some(raw);
        }
        self.completed_at.get_or_insert(now);
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Attach an error summary without touching the status
    pub fn annotate(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    /// Decode the stored payload, if any
    pub fn stored_result(&self) -> Option<Result<RawResult, ParseError>> {
        self.raw_result.as_ref().map(|value| {
            serde_json::from_value::<RawResult>(value.clone()).map_err(|e| {
                ParseError::MalformedResult(format!("stored result cannot be decoded: {}", e))
            })
        })
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
            error_message: self.error_message.clone(),
        }
    }

    fn transition_error(&self, to: JobStatus) -> JobTransitionError {
        JobTransitionError::InvalidTransition {
            job_id: self.id,
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

/// Public view of a job, as returned by the status and listing operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

// ============================================================================
// Analysis Service Payloads
// ============================================================================

/// Response of `POST /analyze/start`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub batch_id: Option<String>,
}

/// Response envelope of `GET /analyze/results/{batch_id}`.
///
/// `results` stays untyped until the result parser decodes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawResult {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub results: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Option<String>,
}

/// How the analysis service classifies a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamState {
    Completed,
    Failed,
    Cancelled,
    InProgress(String),
}

impl RawResult {
    pub fn upstream_state(&self) -> UpstreamState {
        match self.status.trim().to_lowercase().as_str() {
            "completed" => UpstreamState::Completed,
            "failed" => UpstreamState::Failed,
            "cancelled" | "canceled" => UpstreamState::Cancelled,
            other => UpstreamState::InProgress(other.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.upstream_state() == UpstreamState::Completed
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "results": self.results,
            "errors": self.errors,
        })
    }
}

/// One support interaction as extracted by the analysis service.
///
/// All fields keep the service's free text; conversion happens at ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedTicket {
    pub requester_name: String,
    pub requester_email: String,
    pub responder_name: String,
    pub request_date_raw: String,
    pub first_message_time_raw: String,
    pub reported_problem: String,
    pub category: String,
    pub first_response_time_raw: String,
    pub total_handling_time_raw: String,
}

// ============================================================================
// Domain Records
// ============================================================================

/// Requester represents the person who opened a ticket
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Requester {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub department_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Requester {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            department_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Report is one ingested ticket, owned by exactly one requester
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub analysis_job_id: Option<Uuid>,
    pub technician_name: String,
    pub request_date: NaiveDateTime,
    pub reported_problem: String,
    pub category: String,
    pub first_response_time: Duration,
    pub average_handling_time: Duration,
    pub created_at: DateTime<Utc>,
}
