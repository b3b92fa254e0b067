//! Signals consumed and effects produced by the phase machine

use crate::events::Event;
use crate::session::ServerPhase;
use std::fmt;
use tracing::warn;

/// Input to the phase machine
///
/// Push signals come from the event stream; every other variant is a local
/// signal raised by the orchestrator or by a controller result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// `phase` event from the server
    Server(ServerPhase),
    Progress { step: String, percent: u8 },
    Scoping(String),

    /// The user picked a file to upload
    FileSubmitted,
    /// Upload succeeded; `monitor` tells whether the server keeps processing
    UploadAccepted { monitor: bool },
    UploadFailed(String),
    /// The last question was answered
    AnswersComplete,
    /// Policy update or analysis start was rejected
    PolicyFailed(String),
    /// Analysis fetched and document generated
    ArtifactsReady,
    FinalizeFailed { step: FailedStep, message: String },
    /// The user asked to run a halted finalization again
    RetryFinalize,
    /// The user dismissed a terminal screen or a halted analysis
    Acknowledge,
}

impl Signal {
    /// Maps a push event to a signal.
    ///
    /// Unknown phase names are logged and dropped. `Done` carries no phase
    /// information and is handled by the stream client.
    pub fn from_event(event: &Event) -> Option<Signal> {
        match event {
            Event::Phase { phase } => match phase.parse::<ServerPhase>() {
                Ok(phase) => Some(Signal::Server(phase)),
                Err(e) => {
                    warn!(phase = %phase, "Ignoring {}", e);
                    None
                }
            },
            Event::Progress { step, percent } => Some(Signal::Progress {
                step: step.clone(),
                percent: (*percent).min(100),
            }),
            Event::Scoping { result } => Some(Signal::Scoping(result.clone())),
            Event::Done => None,
        }
    }

    pub fn is_push(&self) -> bool {
        matches!(
            self,
            Signal::Server(_) | Signal::Progress { .. } | Signal::Scoping(_)
        )
    }
}

/// Request/response step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStep {
    Upload,
    Policy,
    FetchAnalysis,
    GenerateDocument,
}

impl fmt::Display for FailedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailedStep::Upload => "upload",
            FailedStep::Policy => "policy submission",
            FailedStep::FetchAnalysis => "analysis fetch",
            FailedStep::GenerateDocument => "document generation",
        };
        f.write_str(label)
    }
}

/// Work the orchestrator performs after a transition, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SubmitUpload,
    OpenStream,
    ResetProgress,
    UpdateProgress { step: String, percent: u8 },
    /// Clear answers and put the cursor on the first question
    StartQuestioning,
    ApplyScoping(String),
    AwaitResult,
    /// Update the policy, then start the analysis
    SubmitPolicy,
    /// Drop the last answer so the user can resubmit it
    RewindQuestion,
    /// Fetch the analysis, then generate the document
    FinalizeArtifacts,
    Render,
    ReportFailure { step: FailedStep, message: String },
    SurfaceServerError,
    ResetSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_event_maps_to_server_signal() {
        let event = Event::Phase {
            phase: "Questioning".to_string(),
        };
        assert_eq!(
            Signal::from_event(&event),
            Some(Signal::Server(ServerPhase::Questioning))
        );
    }

    #[test]
    fn test_unknown_phase_is_dropped() {
        let event = Event::Phase {
            phase: "transcoding".to_string(),
        };
        assert_eq!(Signal::from_event(&event), None);
    }

    #[test]
    fn test_done_has_no_signal() {
        assert_eq!(Signal::from_event(&Event::Done), None);
    }

    #[test]
    fn test_progress_is_clamped() {
        let event = Event::Progress {
            step: "clip".to_string(),
            percent: 140,
        };
        assert_eq!(
            Signal::from_event(&event),
            Some(Signal::Progress {
                step: "clip".to_string(),
                percent: 100
            })
        );
    }

    #[test]
    fn test_push_classification() {
        assert!(Signal::Scoping(String::new()).is_push());
        assert!(!Signal::Acknowledge.is_push());
        assert!(!Signal::AnswersComplete.is_push());
    }
}
