use crate::api::{ApiError, BackendApi, UploadPayload, UploadStatus};
use crate::session::{SessionContext, UploadMetadata};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// 2 GiB, the server's own limit
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// File and metadata picked by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub business_title: String,
    pub author_name: String,
    pub additional_notes: String,
}

impl UploadRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.business_title = title.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author_name = author.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.additional_notes = notes.into();
        self
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The server processes the file; progress arrives over the event stream
    Monitor,
    /// Nothing to process
    Completed,
}

#[derive(Debug, Clone)]
pub struct UploadController {
    max_bytes: u64,
}

impl Default for UploadController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl UploadController {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Checks the file and builds the multipart payload without sending anything
    pub async fn prepare(
        &self,
        context: &SessionContext,
        request: &UploadRequest,
    ) -> Result<UploadPayload, ApiError> {
        let io_error = |source| ApiError::Io {
            path: request.path.clone(),
            source,
        };

        let metadata = tokio::fs::metadata(&request.path).await.map_err(io_error)?;
        if !metadata.is_file() {
            return Err(io_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        if metadata.len() > self.max_bytes {
            return Err(ApiError::FileTooLarge {
                size: metadata.len(),
                limit: self.max_bytes,
            });
        }

        Ok(UploadPayload {
            session_id: context.session_id().clone(),
            file_name: request.file_name(),
            mime_type: guess_mime(&request.path),
            path: request.path.clone(),
            business_title: request.business_title.clone(),
            author_name: request.author_name.clone(),
            additional_notes: request.additional_notes.clone(),
        })
    }

    /// Sends the file. Failures are returned as-is and never retried.
    pub async fn submit<B>(
        &self,
        backend: &B,
        context: &mut SessionContext,
        request: &UploadRequest,
    ) -> Result<UploadOutcome, ApiError>
    where
        B: BackendApi + ?Sized,
    {
        let payload = self.prepare(context, request).await?;
        let response = backend.submit_file(&payload).await?;

        // Only an accepted upload belongs to the session
        context.set_metadata(UploadMetadata {
            file_name: payload.file_name,
            business_title: payload.business_title,
            author_name: payload.author_name,
            additional_notes: payload.additional_notes,
        });
        info!(
            session_id = %context.session_id(),
            status = ?response.status,
            message = %response.message,
            "Upload accepted"
        );

        Ok(match response.status {
            UploadStatus::Processing => UploadOutcome::Monitor,
            UploadStatus::Complete => UploadOutcome::Completed,
        })
    }
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
