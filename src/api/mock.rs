use super::client::BackendApi;
use super::error::{ApiError, ApiOperation};
use super::types::{
    AnalysisResponse, DocumentResponse, SessionStatus, StoredDocument, UploadPayload,
    UploadResponse, UploadStatus,
};
use crate::session::SessionId;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// A call recorded by [`MockBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    SubmitFile { session_id: String, file_name: String },
    UpdatePolicy { session_id: String, policy: String },
    StartAnalysis { session_id: String },
    FetchAnalysis { session_id: String },
    GenerateDocument { session_id: String },
    FetchStatus { session_id: String },
    FetchDocument { session_id: String },
}

impl ApiCall {
    pub fn operation(&self) -> ApiOperation {
        match self {
            ApiCall::SubmitFile { .. } => ApiOperation::SubmitFile,
            ApiCall::UpdatePolicy { .. } => ApiOperation::UpdatePolicy,
            ApiCall::StartAnalysis { .. } => ApiOperation::StartAnalysis,
            ApiCall::FetchAnalysis { .. } => ApiOperation::FetchAnalysis,
            ApiCall::GenerateDocument { .. } => ApiOperation::GenerateDocument,
            ApiCall::FetchStatus { .. } => ApiOperation::FetchStatus,
            ApiCall::FetchDocument { .. } => ApiOperation::FetchDocument,
        }
    }
}

#[derive(Debug, Clone)]
struct MockFailure {
    status: u16,
    message: String,
}

/// In-memory backend with canned responses and a call log
pub struct MockBackend {
    calls: Mutex<Vec<ApiCall>>,
    failures: Mutex<HashMap<ApiOperation, VecDeque<MockFailure>>>,
    upload_status: Mutex<UploadStatus>,
    analysis: Mutex<String>,
    document: Mutex<String>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            upload_status: Mutex::new(UploadStatus::Processing),
            analysis: Mutex::new("video analysis".to_string()),
            document: Mutex::new("# Handover document".to_string()),
        }
    }

    pub fn with_upload_status(self, status: UploadStatus) -> Self {
        *self.upload_status.lock().unwrap() = status;
        self
    }

    pub fn with_analysis(self, analysis: impl Into<String>) -> Self {
        *self.analysis.lock().unwrap() = analysis.into();
        self
    }

    pub fn with_document(self, document: impl Into<String>) -> Self {
        *self.document.lock().unwrap() = document.into();
        self
    }

    /// Makes the next call of `operation` fail with an HTTP status
    pub fn fail_next(&self, operation: ApiOperation, status: u16, message: impl Into<String>) {
        self.failures
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(MockFailure {
                status,
                message: message.into(),
            });
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<ApiOperation> {
        self.calls().iter().map(ApiCall::operation).collect()
    }

    pub fn count(&self, operation: ApiOperation) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    fn record(&self, call: ApiCall) -> Result<(), ApiError> {
        let operation = call.operation();
        self.calls.lock().unwrap().push(call);

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(failure) => Err(ApiError::Status {
                operation,
                status: failure.status,
                message: failure.message,
            }),
            None => Ok(()),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("calls", &self.calls.lock().unwrap().len())
            .finish()
    }
}

#[async_trait]
impl BackendApi for MockBackend {
    async fn submit_file(&self, payload: &UploadPayload) -> Result<UploadResponse, ApiError> {
        self.record(ApiCall::SubmitFile {
            session_id: payload.session_id.to_string(),
            file_name: payload.file_name.clone(),
        })?;
        let status = *self.upload_status.lock().unwrap();
        Ok(UploadResponse {
            status,
            message: "accepted".to_string(),
            session_id: Some(payload.session_id.to_string()),
        })
    }

    async fn update_policy(&self, session_id: &SessionId, policy: &str) -> Result<(), ApiError> {
        self.record(ApiCall::UpdatePolicy {
            session_id: session_id.to_string(),
            policy: policy.to_string(),
        })
    }

    async fn start_analysis(&self, session_id: &SessionId) -> Result<(), ApiError> {
        self.record(ApiCall::StartAnalysis {
            session_id: session_id.to_string(),
        })
    }

    async fn fetch_analysis(&self, session_id: &SessionId) -> Result<AnalysisResponse, ApiError> {
        self.record(ApiCall::FetchAnalysis {
            session_id: session_id.to_string(),
        })?;
        Ok(AnalysisResponse {
            phase: Some("complete".to_string()),
            video_analysis: Some(self.analysis.lock().unwrap().clone()),
            ..AnalysisResponse::default()
        })
    }

    async fn generate_document(
        &self,
        session_id: &SessionId,
    ) -> Result<DocumentResponse, ApiError> {
        self.record(ApiCall::GenerateDocument {
            session_id: session_id.to_string(),
        })?;
        Ok(DocumentResponse {
            status: Some("success".to_string()),
            document: self.document.lock().unwrap().clone(),
        })
    }

    async fn fetch_status(&self, session_id: &SessionId) -> Result<SessionStatus, ApiError> {
        self.record(ApiCall::FetchStatus {
            session_id: session_id.to_string(),
        })?;
        Ok(SessionStatus {
            phase: "complete".to_string(),
            ..SessionStatus::default()
        })
    }

    async fn fetch_document(&self, session_id: &SessionId) -> Result<StoredDocument, ApiError> {
        self.record(ApiCall::FetchDocument {
            session_id: session_id.to_string(),
        })?;
        Ok(StoredDocument {
            document: Some(self.document.lock().unwrap().clone()),
            video_analysis: Some(self.analysis.lock().unwrap().clone()),
        })
    }

    fn name(&self) -> &str {
        "MockBackend"
    }
}
