//! Workflow notices and the handler trait

use crate::controllers::{Question, ScopingInsight};
use crate::machine::FailedStep;
use crate::session::Phase;

/// User-visible happenings of a workflow run
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowNotice {
    PhaseChanged { from: Phase, to: Phase },

    UploadStarted { file_name: String },

    /// Processing progress reported by the server
    Progress { step: String, percent: u8 },

    ScopingUpdated(ScopingInsight),

    /// A question is waiting for an answer; `index` is 0-based
    QuestionAsked {
        index: usize,
        total: usize,
        question: Question,
    },

    AnswerRejected { reason: String },

    /// Answers were submitted and the server is analyzing the recording
    AnalysisStarted,

    /// A request/response step failed; it is not retried
    StepFailed { step: FailedStep, message: String },

    /// The server moved the session to its error phase
    ServerError,

    /// Live updates stopped after the reconnection budget ran out
    ConnectionFailed { attempts: u32 },

    Completed {
        document: Option<String>,
        analysis: Option<String>,
    },
}

/// Receives workflow notices
pub trait NoticeHandler: Send + Sync {
    fn on_notice(&self, notice: &WorkflowNotice);
}

/// No-op handler that ignores all notices
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl NoticeHandler for NoOpHandler {
    fn on_notice(&self, _notice: &WorkflowNotice) {}
}
