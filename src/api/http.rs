//! reqwest implementation of [`BackendApi`]

use super::client::BackendApi;
use super::error::{ApiError, ApiOperation};
use super::types::{
    AnalysisResponse, DocumentRequest, DocumentResponse, ErrorBody, PolicyRequest, SessionStatus,
    StoredDocument, UploadPayload, UploadResponse,
};
use crate::config::ClientConfig;
use crate::session::SessionId;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    analysis_timeout: Duration,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        analysis_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::ClientInit(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
            analysis_timeout,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(
            config.server_url.clone(),
            config.request_timeout(),
            config.analysis_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: ApiOperation,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let started = Instant::now();
        let response = request.send().await.map_err(|e| network(operation, e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| network(operation, e))?;

        debug!(
            operation = %operation,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Backend call finished"
        );

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.message())
                .unwrap_or_else(|_| {
                    let trimmed = body.trim();
                    if trimmed.is_empty() {
                        status.canonical_reason().unwrap_or("request failed").to_string()
                    } else {
                        trimmed.to_string()
                    }
                });
            return Err(ApiError::Status {
                operation,
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse {
            operation,
            message: e.to_string(),
        })
    }
}

fn network(operation: ApiOperation, error: reqwest::Error) -> ApiError {
    let message = if error.is_timeout() {
        format!("request timed out ({})", error)
    } else {
        error.to_string()
    };
    ApiError::Network { operation, message }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn submit_file(&self, payload: &UploadPayload) -> Result<UploadResponse, ApiError> {
        let operation = ApiOperation::SubmitFile;
        let io_error = |source| ApiError::Io {
            path: payload.path.clone(),
            source,
        };

        let file = tokio::fs::File::open(&payload.path).await.map_err(io_error)?;
        let length = file.metadata().await.map_err(io_error)?.len();

        let part = Part::stream_with_length(reqwest::Body::from(file), length)
            .file_name(payload.file_name.clone())
            .mime_str(&payload.mime_type)
            .map_err(|e| ApiError::InvalidRequest {
                operation,
                message: e.to_string(),
            })?;

        let form = Form::new()
            .part("file", part)
            .text("session_id", payload.session_id.to_string())
            .text("business_title", payload.business_title.clone())
            .text("author_name", payload.author_name.clone())
            .text("additional_notes", payload.additional_notes.clone());

        info!(
            file = %payload.file_name,
            bytes = length,
            mime = %payload.mime_type,
            "Uploading file"
        );

        // Large recordings take a while to transfer
        let request = self
            .client
            .post(self.url("upload"))
            .timeout(self.analysis_timeout)
            .multipart(form);
        self.send(operation, request).await
    }

    async fn update_policy(&self, session_id: &SessionId, policy: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url("policy"))
            .timeout(self.request_timeout)
            .json(&PolicyRequest {
                session_id: session_id.as_str(),
                policy,
            });
        self.send::<IgnoredAny>(ApiOperation::UpdatePolicy, request)
            .await
            .map(|_| ())
    }

    async fn start_analysis(&self, session_id: &SessionId) -> Result<(), ApiError> {
        let request = self
            .client
            .post(self.url(&format!("analyze/{}", session_id)))
            .timeout(self.analysis_timeout);
        self.send::<IgnoredAny>(ApiOperation::StartAnalysis, request)
            .await
            .map(|_| ())
    }

    async fn fetch_analysis(&self, session_id: &SessionId) -> Result<AnalysisResponse, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("analysis/{}", session_id)))
            .timeout(self.request_timeout);
        self.send(ApiOperation::FetchAnalysis, request).await
    }

    async fn generate_document(
        &self,
        session_id: &SessionId,
    ) -> Result<DocumentResponse, ApiError> {
        let request = self
            .client
            .post(self.url("generate-document"))
            .timeout(self.analysis_timeout)
            .json(&DocumentRequest {
                session_id: session_id.as_str(),
            });
        self.send(ApiOperation::GenerateDocument, request).await
    }

    async fn fetch_status(&self, session_id: &SessionId) -> Result<SessionStatus, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("status/{}", session_id)))
            .timeout(self.request_timeout);
        self.send(ApiOperation::FetchStatus, request).await
    }

    async fn fetch_document(&self, session_id: &SessionId) -> Result<StoredDocument, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("document/{}", session_id)))
            .timeout(self.request_timeout);
        self.send(ApiOperation::FetchDocument, request).await
    }

    fn name(&self) -> &str {
        "HttpBackend"
    }
}
