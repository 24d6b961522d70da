use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;

use crate::handlers::ErrorResponse;
use crate::state::AppState;
use common::analysis_client::ArchiveUpload;
use common::models::JobSummary;

/// Response of a successful submission
#[derive(Debug, Serialize)]
pub struct StartAnalysisResponse {
    pub job_id: Uuid,
}

/// Response of a manual reprocess
#[derive(Debug, Serialize)]
pub struct ReprocessResponse {
    pub message: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

fn multipart_error(err: MultipartError) -> ErrorResponse {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorResponse::new("payload_too_large", err.body_text())
    } else {
        ErrorResponse::new("validation_error", err.body_text())
    }
}

fn io_error(err: std::io::Error) -> ErrorResponse {
    ErrorResponse::new("internal_error", format!("Failed to spool upload: {}", err))
}

/// Archive spooled to an anonymous temp file, removed when the handle closes
struct SpooledArchive {
    file_name: String,
    file: tokio::fs::File,
    length: u64,
}

/// Submit an archive for analysis
///
/// Multipart fields: `file` (the .zip archive) and `name` (the job name).
#[tracing::instrument(skip(state, multipart))]
pub async fn start_analysis(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StartAnalysisResponse>), ErrorResponse> {
    let max_bytes = state.service.max_upload_bytes();
    let mut archive: Option<SpooledArchive> = None;
    let mut job_name: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let temp = tempfile::tempfile().map_err(io_error)?;
                let mut file = tokio::fs::File::from_std(temp);
                let mut length: u64 = 0;

                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    length += chunk.len() as u64;
                    if length > max_bytes {
                        return Err(ErrorResponse::new(
                            "validation_error",
                            format!("the archive exceeds the {} byte limit", max_bytes),
                        ));
                    }
                    file.write_all(&chunk).await.map_err(io_error)?;
                }
                file.flush().await.map_err(io_error)?;
                file.rewind().await.map_err(io_error)?;

                archive = Some(SpooledArchive {
                    file_name,
                    file,
                    length,
                });
            }
            Some("name") => {
                job_name = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {
                tracing::debug!(field = ?field_name, "Ignoring unknown multipart field");
            }
        }
    }

    let archive = archive
        .ok_or_else(|| ErrorResponse::new("validation_error", "a file field is required"))?;

    let job_id = state
        .service
        .start_analysis(ArchiveUpload {
            file_name: archive.file_name,
            job_name: job_name.unwrap_or_default(),
            file: archive.file,
            length: archive.length,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(StartAnalysisResponse { job_id })))
}

/// Status of one analysis job
#[tracing::instrument(skip(state))]
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobSummary>, ErrorResponse> {
    let summary = state
        .service
        .get_job_status(job_id)
        .await?
        .ok_or_else(|| {
            ErrorResponse::new("not_found", format!("Analysis job not found: {}", job_id))
        })?;

    Ok(Json(summary))
}

/// Every analysis job, newest first
#[tracing::instrument(skip(state))]
pub async fn list_jobs(
    State(state): State<AppState>,
) -> Result<Json<Vec<JobSummary>>, ErrorResponse> {
    Ok(Json(state.service.list_jobs().await?))
}

/// Manually resync one job
#[tracing::instrument(skip(state))]
pub async fn reprocess_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ReprocessResponse>, ErrorResponse> {
    let outcome = state.service.reprocess_job(job_id).await?;
    let (total, succeeded, failed) = outcome
        .report
        .as_ref()
        .map(|r| (r.total, r.succeeded, r.failed))
        .unwrap_or_default();

    Ok(Json(ReprocessResponse {
        message: outcome.message,
        total,
        succeeded,
        failed,
    }))
}
