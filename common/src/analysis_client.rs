// HTTP client for the external analysis service

use crate::config::AnalysisServiceConfig;
use crate::errors::AnalysisClientError;
use crate::models::{RawResult, StartResponse};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::instrument;

/// An archive ready to be streamed to the analysis service
#[derive(Debug)]
pub struct ArchiveUpload {
    pub file_name: String,
    pub job_name: String,
    pub file: tokio::fs::File,
    pub length: u64,
}

/// Transport to the analysis service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Submit an archive, returning the service's batch id
    async fn submit(&self, upload: ArchiveUpload) -> Result<String, AnalysisClientError>;

    /// Fetch the current result envelope of a batch
    async fn fetch_result(&self, batch_id: &str) -> Result<RawResult, AnalysisClientError>;
}

/// reqwest-backed `AnalysisClient`
pub struct HttpAnalysisClient {
    client: Client,
    base_url: String,
}

impl HttpAnalysisClient {
    /// Create a client from the analysis service configuration
    pub fn new(config: &AnalysisServiceConfig) -> Result<Self, AnalysisClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| {
                AnalysisClientError::ProtocolError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn ensure_success(response: Response) -> Result<Response, AnalysisClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(AnalysisClientError::UpstreamError {
            status: status.as_u16(),
            body,
        })
    }

    /// Read the whole body, then decode it.
    ///
    /// Failures while the body is in flight are transport errors; only a
    /// body that arrived and does not decode is a protocol error.
    async fn read_json<T: DeserializeOwned>(
        response: Response,
        what: &str,
    ) -> Result<T, AnalysisClientError> {
        let body = response.bytes().await.map_err(|e| {
            AnalysisClientError::ServiceUnavailable(format!("failed to read {}: {}", what, e))
        })?;
        serde_json::from_slice(&body)
            .map_err(|e| AnalysisClientError::ProtocolError(format!("invalid {}: {}", what, e)))
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, length = upload.length))]
    async fn submit(&self, upload: ArchiveUpload) -> Result<String, AnalysisClientError> {
        let url = format!("{}/analyze/start", self.base_url);

        let file_part = Part::stream_with_length(Body::from(upload.file), upload.length)
            .file_name(upload.file_name)
            .mime_str("application/zip")
            .map_err(|e| AnalysisClientError::ProtocolError(e.to_string()))?;
        let form = Form::new()
            .part("file", file_part)
            .text("name", upload.job_name);

        let response = self.client.post(&url).multipart(form).send().await?;
        let response = Self::ensure_success(response).await?;

        let start: StartResponse = Self::read_json(response, "start response").await?;

        match start.batch_id {
            Some(batch_id) if !batch_id.trim().is_empty() => {
                tracing::info!(batch_id = %batch_id, "Archive accepted by analysis service");
                Ok(batch_id)
            }
            _ => Err(AnalysisClientError::ProtocolError(
                "start response carried no batch_id".to_string(),
            )),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_result(&self, batch_id: &str) -> Result<RawResult, AnalysisClientError> {
        let url = format!("{}/analyze/results/{}", self.base_url, batch_id);

        let response = self.client.get(&url).send().await?;
        let response = Self::ensure_success(response).await?;

        let raw: RawResult = Self::read_json(response, "result envelope").await?;

        tracing::debug!(batch_id, status = %raw.status, "Fetched analysis result");
        Ok(raw)
    }
}
