// Error handling framework for the analysis pipeline

use thiserror::Error;
use uuid::Uuid;

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Job {job_id} was modified concurrently (expected version {expected_version})")]
    ConcurrencyConflict { job_id: Uuid, expected_version: i64 },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

impl DatabaseError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, DatabaseError::ConcurrencyConflict { .. })
    }
}

/// Errors raised while talking to the external analysis service
#[derive(Error, Debug)]
pub enum AnalysisClientError {
    /// The request never completed (connect failure, timeout, broken stream).
    #[error("Analysis service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Analysis service responded with status {status}: {body}")]
    UpstreamError { status: u16, body: String },

    #[error("Unexpected response from analysis service: {0}")]
    ProtocolError(String),
}

impl AnalysisClientError {
    /// Transient errors leave the job pending; the next poll cycle retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalysisClientError::ServiceUnavailable(_))
    }
}

/// Structural decode failures of a result payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed analysis result: {0}")]
    MalformedResult(String),
}

/// A ticket that broke one or more field rules
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation failed: {}", violations.join("; "))]
pub struct ValidationFailure {
    pub violations: Vec<String>,
}

/// Per-record ingestion errors, always caught by the job processor
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error("Failed to stage ticket: {0}")]
    Store(#[from] DatabaseError),
}

/// Lifecycle violations on an analysis job
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobTransitionError {
    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition { job_id: Uuid, from: String, to: String },
}

/// Errors escaping the job processor
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error(transparent)]
    Malformed(#[from] ParseError),

    #[error("Job {0} has no stored result to process")]
    NoStoredResult(Uuid),

    #[error("Failed to persist job state: {0}")]
    Store(#[from] DatabaseError),
}

/// Errors surfaced to the caller of a manual resync
#[derive(Error, Debug)]
pub enum ResyncError {
    #[error("Analysis job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Invalid job state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Upstream(#[from] AnalysisClientError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Transition(#[from] JobTransitionError),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// Errors of the submission boundary operation
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error(transparent)]
    Upstream(#[from] AnalysisClientError),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        "23503" => DatabaseError::ForeignKeyViolation(db_err.message().to_string()),
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionFailed(err.to_string())
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(err.to_string())
    }
}

/// Errors from sending a request; body decoding is classified by the client
impl From<reqwest::Error> for AnalysisClientError {
    fn from(err: reqwest::Error) -> Self {
        AnalysisClientError::ServiceUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_failure_lists_every_violation() {
        let err = ValidationFailure {
            violations: vec![
                "requester email is required".to_string(),
                "category is required".to_string(),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("requester email is required"));
        assert!(text.contains("category is required"));
    }

    #[test]
    fn test_only_service_unavailable_is_transient() {
        assert!(AnalysisClientError::ServiceUnavailable("refused".into()).is_transient());
        assert!(!AnalysisClientError::UpstreamError {
            status: 500,
            body: String::new()
        }
        .is_transient());
        assert!(!AnalysisClientError::ProtocolError("bad json".into()).is_transient());
    }

    #[test]
    fn test_concurrency_conflict_display() {
        let job_id = Uuid::new_v4();
        let err = DatabaseError::ConcurrencyConflict {
            job_id,
            expected_version: 3,
        };
        assert!(err.is_concurrency_conflict());
        assert!(err.to_string().contains(&job_id.to_string()));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }
}
