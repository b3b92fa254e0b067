//! Request/response errors

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which backend call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    SubmitFile,
    UpdatePolicy,
    StartAnalysis,
    FetchAnalysis,
    GenerateDocument,
    FetchStatus,
    FetchDocument,
}

impl fmt::Display for ApiOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApiOperation::SubmitFile => "submit file",
            ApiOperation::UpdatePolicy => "update policy",
            ApiOperation::StartAnalysis => "start analysis",
            ApiOperation::FetchAnalysis => "fetch analysis",
            ApiOperation::GenerateDocument => "generate document",
            ApiOperation::FetchStatus => "fetch status",
            ApiOperation::FetchDocument => "fetch document",
        };
        f.write_str(label)
    }
}

/// Errors from the backend request/response calls. None of them is retried.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response; `message` is the server's `detail` when present
    #[error("{operation} failed with HTTP {status}: {message}")]
    Status {
        operation: ApiOperation,
        status: u16,
        message: String,
    },

    #[error("{operation} failed: network error: {message}")]
    Network {
        operation: ApiOperation,
        message: String,
    },

    #[error("{operation} returned an invalid response: {message}")]
    InvalidResponse {
        operation: ApiOperation,
        message: String,
    },

    #[error("{operation} request could not be built: {message}")]
    InvalidRequest {
        operation: ApiOperation,
        message: String,
    },

    #[error("File is too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize HTTP client: {0}")]
    ClientInit(String),
}

impl ApiError {
    pub fn operation(&self) -> Option<ApiOperation> {
        match self {
            ApiError::Status { operation, .. }
            | ApiError::Network { operation, .. }
            | ApiError::InvalidResponse { operation, .. }
            | ApiError::InvalidRequest { operation, .. } => Some(*operation),
            ApiError::FileTooLarge { .. } => Some(ApiOperation::SubmitFile),
            ApiError::Io { .. } | ApiError::ClientInit(_) => None,
        }
    }

    /// Message shown to the user: the server's detail when available
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Returns a user-friendly error message with troubleshooting hints
    pub fn help_message(&self) -> String {
        match self {
            ApiError::Network { message, .. } => format!(
                "Error: Cannot reach the handover server\nDetails: {}\n\n\
                Help: Check that the server is running and reachable.\n\
                Configuration:\n\
                - HIKITSUGI_SERVER_URL (default: http://localhost:8000)\n\
                - HIKITSUGI_REQUEST_TIMEOUT (default: 30 seconds)",
                message
            ),
            ApiError::FileTooLarge { size, limit } => format!(
                "Error: File is too large ({} bytes)\n\n\
                Help: The server accepts files up to {} bytes.\n\
                Trim the recording or raise HIKITSUGI_MAX_UPLOAD_BYTES if the server allows it.",
                size, limit
            ),
            ApiError::Status {
                status: 404,
                operation,
                ..
            } => format!(
                "Error: {} failed: session not found\n\n\
                Help: The server keeps sessions in memory only. \
                Sessions are lost when it restarts.",
                operation
            ),
            ApiError::Status {
                status,
                operation,
                message,
            } if *status >= 500 => format!(
                "Error: {} failed on the server (HTTP {})\nDetails: {}\n\n\
                Help: Check the server logs. Long analyses may also hit \
                HIKITSUGI_ANALYSIS_TIMEOUT (default: 1800 seconds).",
                operation, status, message
            ),
            other => format!("Error: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_uses_detail() {
        let err = ApiError::Status {
            operation: ApiOperation::GenerateDocument,
            status: 400,
            message: "analysis missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "generate document failed with HTTP 400: analysis missing"
        );
        assert_eq!(err.user_message(), "analysis missing");
        assert_eq!(err.operation(), Some(ApiOperation::GenerateDocument));
    }

    #[test]
    fn test_help_message_for_network_errors() {
        let err = ApiError::Network {
            operation: ApiOperation::SubmitFile,
            message: "connection refused".to_string(),
        };
        let help = err.help_message();
        assert!(help.contains("HIKITSUGI_SERVER_URL"));
        assert!(help.contains("connection refused"));
    }

    #[test]
    fn test_file_too_large_belongs_to_upload() {
        let err = ApiError::FileTooLarge { size: 10, limit: 5 };
        assert_eq!(err.operation(), Some(ApiOperation::SubmitFile));
        assert!(err.help_message().contains("HIKITSUGI_MAX_UPLOAD_BYTES"));
    }
}
