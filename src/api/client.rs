use super::error::ApiError;
use super::types::{
    AnalysisResponse, DocumentResponse, SessionStatus, StoredDocument, UploadPayload,
    UploadResponse,
};
use crate::session::SessionId;
use async_trait::async_trait;

/// Request/response calls against the handover server
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn submit_file(&self, payload: &UploadPayload) -> Result<UploadResponse, ApiError>;

    async fn update_policy(&self, session_id: &SessionId, policy: &str) -> Result<(), ApiError>;

    /// Issued exactly once per completed questioning round
    async fn start_analysis(&self, session_id: &SessionId) -> Result<(), ApiError>;

    async fn fetch_analysis(&self, session_id: &SessionId) -> Result<AnalysisResponse, ApiError>;

    async fn generate_document(&self, session_id: &SessionId)
        -> Result<DocumentResponse, ApiError>;

    async fn fetch_status(&self, session_id: &SessionId) -> Result<SessionStatus, ApiError>;

    async fn fetch_document(&self, session_id: &SessionId) -> Result<StoredDocument, ApiError>;

    fn name(&self) -> &str;
}
