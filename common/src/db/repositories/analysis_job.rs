// Analysis job repository implementation

use super::queries::analysis_job_queries;
use crate::db::store::JobStore;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::AnalysisJob;
use async_trait::async_trait;
use tracing::instrument;
use uuid::Uuid;

/// Repository for analysis job rows
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    /// Create a new PgJobStore
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, batch_id = %job.external_batch_id))]
    async fn create(&self, job: &AnalysisJob) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO analysis_jobs (
                id, name, external_batch_id, status, created_at,
                completed_at, raw_result, error_message, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.external_batch_id)
        .bind(job.status.to_string())
        .bind(job.created_at)
        .bind(job.completed_at)
        .bind(&job.raw_result)
        .bind(&job.error_message)
        .bind(job.version)
        .execute(self.pool.pool())
        .await?;

        tracing::info!(job_id = %job.id, name = %job.name, "Analysis job created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AnalysisJob>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM analysis_jobs WHERE id = $1",
            analysis_job_queries::SELECT_ALL_COLUMNS
        );

        let job = sqlx::query_as::<_, AnalysisJob>(&query)
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(job)
    }

    #[instrument(skip(self))]
    async fn find_pending(&self) -> Result<Vec<AnalysisJob>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM analysis_jobs WHERE status = 'pending' ORDER BY created_at ASC",
            analysis_job_queries::SELECT_ALL_COLUMNS
        );

        let jobs = sqlx::query_as::<_, AnalysisJob>(&query)
            .fetch_all(self.pool.pool())
            .await?;

        tracing::debug!(count = jobs.len(), "Found pending analysis jobs");
        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<AnalysisJob>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM analysis_jobs ORDER BY created_at DESC",
            analysis_job_queries::SELECT_ALL_COLUMNS
        );

        let jobs = sqlx::query_as::<_, AnalysisJob>(&query)
            .fetch_all(self.pool.pool())
            .await?;

        Ok(jobs)
    }

    /// Conditional update on the version column.
    ///
    /// `raw_result` and `completed_at` are COALESCEd so a stored payload or
    /// completion time can never be cleared through this path.
    #[instrument(skip(self, job), fields(job_id = %job.id, version = job.version))]
    async fn update(&self, job: &mut AnalysisJob) -> Result<(), DatabaseError> {
        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE analysis_jobs
            SET status = $3,
                completed_at = COALESCE(completed_at, $4),
                raw_result = COALESCE($5, raw_result),
                error_message = $6,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(job.id)
        .bind(job.version)
        .bind(job.status.to_string())
        .bind(job.completed_at)
        .bind(&job.raw_result)
        .bind(&job.error_message)
        .fetch_optional(self.pool.pool())
        .await?;

        match new_version {
            Some(version) => {
                job.version = version;
                tracing::debug!(job_id = %job.id, status = %job.status, version, "Analysis job updated");
                Ok(())
            }
            None => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM analysis_jobs WHERE id = $1)")
                        .bind(job.id)
                        .fetch_one(self.pool.pool())
                        .await?;

                if exists {
                    tracing::warn!(
                        job_id = %job.id,
                        expected_version = job.version,
                        "Stale version on analysis job update"
                    );
                    Err(DatabaseError::ConcurrencyConflict {
                        job_id: job.id,
                        expected_version: job.version,
                    })
                } else {
                    Err(DatabaseError::NotFound(format!(
                        "Analysis job not found: {}",
                        job.id
                    )))
                }
            }
        }
    }
}
