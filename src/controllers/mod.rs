//! Step controllers
//!
//! Controllers issue the request/response calls of one workflow step and fold
//! the results into the session context. They never change the phase; the
//! orchestrator turns their results into machine signals.

pub mod analysis;
pub mod questioning;
pub mod scoping;
pub mod upload;

pub use analysis::{AnalysisController, FinalizeError};
pub use questioning::{
    default_questions, policy_document, AnswerError, AnswerOutcome, Question, QuestionKind,
    QuestioningController,
};
pub use scoping::{Extracted, ScopingInsight};
pub use upload::{UploadController, UploadOutcome, UploadRequest, DEFAULT_MAX_UPLOAD_BYTES};
