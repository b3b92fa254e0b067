//! Backend request/response API
//!
//! [`BackendApi`] covers every call the workflow makes besides the event
//! stream. [`HttpBackend`] talks to a running server; [`MockBackend`] replays
//! canned responses for tests.

pub mod client;
pub mod error;
pub mod http;
pub mod mock;
pub mod types;

pub use client::BackendApi;
pub use error::{ApiError, ApiOperation};
pub use http::HttpBackend;
pub use mock::{ApiCall, MockBackend};
pub use types::{
    AnalysisResponse, DocumentResponse, SessionStatus, StoredDocument, UploadPayload,
    UploadResponse, UploadStatus,
};
