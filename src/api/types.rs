//! Request and response bodies of the handover server API

use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything sent with `POST /api/upload`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    pub session_id: SessionId,
    pub file_name: String,
    pub mime_type: String,
    pub path: PathBuf,
    pub business_title: String,
    pub author_name: String,
    pub additional_notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// The server keeps working on the file; follow the event stream
    Processing,
    /// Nothing to process (e.g. not a video)
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: UploadStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyRequest<'a> {
    pub session_id: &'a str,
    pub policy: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRequest<'a> {
    pub session_id: &'a str,
}

/// `GET /api/analysis/{session_id}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub scoping_result: Option<String>,
    #[serde(default)]
    pub user_policy: Option<String>,
    #[serde(default)]
    pub video_analysis: Option<String>,
}

/// `POST /api/generate-document`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentResponse {
    #[serde(default)]
    pub status: Option<String>,
    pub document: String,
}

/// `GET /api/status/{session_id}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub scoping_result: Option<String>,
    #[serde(default)]
    pub user_policy: Option<String>,
}

/// `GET /api/document/{session_id}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub video_analysis: Option<String>,
}

/// Body of every non-2xx response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    /// `detail` is a string for handled errors and a list for validation errors
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
