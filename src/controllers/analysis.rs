use crate::api::{ApiError, ApiOperation, BackendApi};
use crate::machine::FailedStep;
use crate::session::{ContextError, SessionContext};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("Failed to fetch the analysis: {0}")]
    FetchAnalysis(#[source] ApiError),

    #[error("Failed to generate the document: {0}")]
    GenerateDocument(#[source] ApiError),

    #[error("Failed to store the {step} result: {source}")]
    Store {
        step: FailedStep,
        #[source]
        source: ContextError,
    },
}

impl FinalizeError {
    pub fn failed_step(&self) -> FailedStep {
        match self {
            FinalizeError::FetchAnalysis(_) => FailedStep::FetchAnalysis,
            FinalizeError::GenerateDocument(_) => FailedStep::GenerateDocument,
            FinalizeError::Store { step, .. } => *step,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            FinalizeError::FetchAnalysis(e) | FinalizeError::GenerateDocument(e) => {
                e.user_message()
            }
            other => other.to_string(),
        }
    }
}

/// Fetch-then-generate sub-flow run once the server reports completion
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisController;

impl AnalysisController {
    pub fn new() -> Self {
        Self
    }

    /// Fetches the analysis, stores it, generates the document and stores it.
    ///
    /// Stops at the first failure; nothing is retried. An analysis stored by an
    /// earlier attempt is reused.
    pub async fn finalize<B>(
        &self,
        backend: &B,
        context: &mut SessionContext,
    ) -> Result<(), FinalizeError>
    where
        B: BackendApi + ?Sized,
    {
        let started = Instant::now();
        let session_id = context.session_id().clone();

        if context.video_analysis().is_none() {
            let analysis = backend
                .fetch_analysis(&session_id)
                .await
                .map_err(FinalizeError::FetchAnalysis)?;
            let analysis = analysis
                .video_analysis
                .filter(|text| !text.trim().is_empty())
                .ok_or_else(|| {
                    FinalizeError::FetchAnalysis(ApiError::InvalidResponse {
                        operation: ApiOperation::FetchAnalysis,
                        message: "analysis is empty".to_string(),
                    })
                })?;
            context
                .store_video_analysis(analysis)
                .map_err(|source| FinalizeError::Store {
                    step: FailedStep::FetchAnalysis,
                    source,
                })?;
        } else {
            debug!(session_id = %session_id, "Analysis already stored, generating the document");
        }

        let document = backend
            .generate_document(&session_id)
            .await
            .map_err(FinalizeError::GenerateDocument)?;
        if document.document.trim().is_empty() {
            return Err(FinalizeError::GenerateDocument(ApiError::InvalidResponse {
                operation: ApiOperation::GenerateDocument,
                message: "document is empty".to_string(),
            }));
        }
        context
            .store_generated_document(document.document)
            .map_err(|source| FinalizeError::Store {
                step: FailedStep::GenerateDocument,
                source,
            })?;

        info!(
            session_id = %session_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Handover document ready"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockBackend;
    use crate::session::SessionId;

    fn context() -> SessionContext {
        SessionContext::new(SessionId::new("analysis-test").unwrap(), 4)
    }

    #[tokio::test]
    async fn test_fetch_then_generate() {
        let backend = MockBackend::new()
            .with_analysis("1. ログイン\n2. 請求書を開く")
            .with_document("# 引継ぎ資料");
        let mut ctx = context();

        AnalysisController::new()
            .finalize(&backend, &mut ctx)
            .await
            .unwrap();

        assert_eq!(
            backend.operations(),
            vec![ApiOperation::FetchAnalysis, ApiOperation::GenerateDocument]
        );
        assert_eq!(ctx.video_analysis(), Some("1. ログイン\n2. 請求書を開く"));
        assert_eq!(ctx.generated_document(), Some("# 引継ぎ資料"));
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_generation() {
        let backend = MockBackend::new();
        backend.fail_next(ApiOperation::FetchAnalysis, 404, "not found");
        let mut ctx = context();

        let err = AnalysisController::new()
            .finalize(&backend, &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.failed_step(), FailedStep::FetchAnalysis);
        assert_eq!(err.user_message(), "not found");
        assert_eq!(backend.count(ApiOperation::GenerateDocument), 0);
        assert!(ctx.video_analysis().is_none());
    }

    #[tokio::test]
    async fn test_generate_failure_keeps_analysis() {
        let backend = MockBackend::new();
        backend.fail_next(ApiOperation::GenerateDocument, 500, "model overloaded");
        let mut ctx = context();

        let err = AnalysisController::new()
            .finalize(&backend, &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.failed_step(), FailedStep::GenerateDocument);
        assert!(ctx.video_analysis().is_some());
        assert!(ctx.generated_document().is_none());
    }

    #[tokio::test]
    async fn test_second_attempt_reuses_stored_analysis() {
        let backend = MockBackend::new().with_document("# 引継ぎ資料");
        backend.fail_next(ApiOperation::GenerateDocument, 500, "model overloaded");
        let mut ctx = context();
        let controller = AnalysisController::new();

        controller.finalize(&backend, &mut ctx).await.unwrap_err();
        controller.finalize(&backend, &mut ctx).await.unwrap();

        assert_eq!(backend.count(ApiOperation::FetchAnalysis), 1);
        assert_eq!(backend.count(ApiOperation::GenerateDocument), 2);
        assert_eq!(ctx.generated_document(), Some("# 引継ぎ資料"));
    }

    #[tokio::test]
    async fn test_empty_analysis_is_invalid() {
        let backend = MockBackend::new().with_analysis("   ");
        let mut ctx = context();

        let err = AnalysisController::new()
            .finalize(&backend, &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FinalizeError::FetchAnalysis(ApiError::InvalidResponse { .. })
        ));
        assert_eq!(backend.count(ApiOperation::GenerateDocument), 0);
    }
}
