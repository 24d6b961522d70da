// Report and requester persistence inside one ingestion transaction

use super::queries::requester_queries;
use crate::db::store::{ReportStore, ReportTransaction};
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{Report, Requester};
use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::instrument;

const SAVEPOINT_NAME: &str = "ticket";

/// Opens Postgres transactions for report ingestion
pub struct PgReportStore {
    pool: DbPool,
}

impl PgReportStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for PgReportStore {
    #[instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn ReportTransaction>, DatabaseError> {
        let tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        Ok(Box::new(PgReportTransaction { tx }))
    }
}

/// A live sqlx transaction.
///
/// Postgres aborts the whole transaction on the first failing statement, so
/// every ticket runs under `SAVEPOINT ticket` and a failure is undone with
/// `ROLLBACK TO SAVEPOINT` before the batch continues.
pub struct PgReportTransaction {
    tx: Transaction<'static, Postgres>,
}

fn duration_seconds(value: Duration, field: &str) -> Result<i64, DatabaseError> {
    i64::try_from(value.as_secs())
        .map_err(|_| DatabaseError::QueryFailed(format!("{} does not fit in BIGINT seconds", field)))
}

#[async_trait]
impl ReportTransaction for PgReportTransaction {
    #[instrument(skip(self))]
    async fn find_requester_by_email(
        &mut self,
        email: &str,
    ) -> Result<Option<Requester>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM requesters WHERE LOWER(email) = LOWER($1)",
            requester_queries::SELECT_ALL_COLUMNS
        );

        let requester = sqlx::query_as::<_, Requester>(&query)
            .bind(email.trim())
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(requester)
    }

    #[instrument(skip(self, requester), fields(requester_id = %requester.id))]
    async fn insert_requester(&mut self, requester: &Requester) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO requesters (id, name, email, department_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(requester.id)
        .bind(&requester.name)
        .bind(&requester.email)
        .bind(requester.department_id)
        .bind(requester.created_at)
        .execute(&mut *self.tx)
        .await?;

        tracing::debug!(requester_id = %requester.id, "Requester staged");
        Ok(())
    }

    #[instrument(skip(self, report), fields(report_id = %report.id))]
    async fn insert_report(&mut self, report: &Report) -> Result<(), DatabaseError> {
        let first_response = duration_seconds(report.first_response_time, "first_response_time")?;
        let handling = duration_seconds(report.average_handling_time, "average_handling_time")?;

        sqlx::query(
            r#"
            INSERT INTO reports (
                id, requester_id, analysis_job_id, technician_name, request_date,
                reported_problem, category, first_response_seconds,
                average_handling_seconds, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(report.id)
        .bind(report.requester_id)
        .bind(report.analysis_job_id)
        .bind(&report.technician_name)
        .bind(report.request_date)
        .bind(&report.reported_problem)
        .bind(&report.category)
        .bind(first_response)
        .bind(handling)
        .bind(report.created_at)
        .execute(&mut *self.tx)
        .await?;

        tracing::debug!(report_id = %report.id, "Report staged");
        Ok(())
    }

    async fn savepoint(&mut self) -> Result<(), DatabaseError> {
        sqlx::query(&format!("SAVEPOINT {}", SAVEPOINT_NAME))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        Ok(())
    }

    async fn release_savepoint(&mut self) -> Result<(), DatabaseError> {
        sqlx::query(&format!("RELEASE SAVEPOINT {}", SAVEPOINT_NAME))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> Result<(), DatabaseError> {
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", SAVEPOINT_NAME))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx
            .commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }
}
