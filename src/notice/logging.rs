//! Logging-based notice handler

use super::{NoticeHandler, WorkflowNotice};
use tracing::{debug, error, info, warn};

/// Handler that logs notices using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl NoticeHandler for LoggingHandler {
    fn on_notice(&self, notice: &WorkflowNotice) {
        match notice {
            WorkflowNotice::PhaseChanged { from, to } => {
                info!(from = %from, to = %to, "Phase changed");
            }
            WorkflowNotice::UploadStarted { file_name } => {
                info!(file = %file_name, "Uploading");
            }
            WorkflowNotice::Progress { step, percent } => {
                debug!(step = %step, percent, "Processing progress");
            }
            WorkflowNotice::ScopingUpdated(insight) => {
                info!(
                    task_summary = insight.task_summary.is_resolved(),
                    audience = insight.audience.is_resolved(),
                    policy_suggestions = insight.policy_suggestions.is_resolved(),
                    "Scoping insight received"
                );
            }
            WorkflowNotice::QuestionAsked {
                index,
                total,
                question,
            } => {
                info!(
                    question = %question.id,
                    progress = format!("{}/{}", index + 1, total),
                    "Waiting for answer"
                );
            }
            WorkflowNotice::AnswerRejected { reason } => {
                warn!(reason = %reason, "Answer rejected");
            }
            WorkflowNotice::AnalysisStarted => {
                info!("Analysis started");
            }
            WorkflowNotice::StepFailed { step, message } => {
                error!(step = %step, message = %message, "Step failed");
            }
            WorkflowNotice::ServerError => {
                error!("Server reported an error for this session");
            }
            WorkflowNotice::ConnectionFailed { attempts } => {
                error!(attempts, "Lost connection to the event stream");
            }
            WorkflowNotice::Completed { document, analysis } => {
                info!(
                    document_bytes = document.as_ref().map_or(0, String::len),
                    analysis_bytes = analysis.as_ref().map_or(0, String::len),
                    "Workflow complete"
                );
            }
        }
    }
}
