//! Pure transition function of the phase machine

use super::signal::{Effect, FailedStep, Signal};
use crate::session::{AnalyzingStage, Phase, ServerPhase, SessionContext};
use tracing::{debug, info};

/// Result of applying one signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: Phase,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: Phase, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }

    fn stay(current: Phase) -> Self {
        Self {
            next: current,
            effects: Vec::new(),
        }
    }
}

/// Computes the next phase and the effects for `signal` in `current`.
///
/// Signals that make no sense in the current phase leave it unchanged and
/// produce no effects.
pub fn transition(current: Phase, signal: &Signal) -> Transition {
    use AnalyzingStage::*;

    if current.is_terminal() {
        return match signal {
            Signal::Acknowledge => Transition::to(Phase::Welcome, vec![Effect::ResetSession]),
            _ => Transition::stay(current),
        };
    }

    match signal {
        Signal::Server(server) => server_transition(current, *server),

        Signal::Progress { step, percent } => match current {
            Phase::Uploading | Phase::Processing => Transition::to(
                current,
                vec![Effect::UpdateProgress {
                    step: step.clone(),
                    percent: (*percent).min(100),
                }],
            ),
            _ => Transition::stay(current),
        },

        Signal::Scoping(text) => match current {
            Phase::Questioning => {
                Transition::to(current, vec![Effect::ApplyScoping(text.clone())])
            }
            _ => Transition::stay(current),
        },

        Signal::FileSubmitted => match current {
            Phase::Welcome | Phase::Uploading => {
                Transition::to(Phase::Uploading, vec![Effect::SubmitUpload])
            }
            _ => Transition::stay(current),
        },

        Signal::UploadAccepted { monitor } => match current {
            Phase::Uploading if *monitor => {
                Transition::to(Phase::Uploading, vec![Effect::OpenStream])
            }
            Phase::Uploading => Transition::to(Phase::Complete, vec![Effect::Render]),
            _ => Transition::stay(current),
        },

        Signal::UploadFailed(message) => match current {
            Phase::Uploading => Transition::to(
                Phase::Welcome,
                vec![Effect::ReportFailure {
                    step: FailedStep::Upload,
                    message: message.clone(),
                }],
            ),
            _ => Transition::stay(current),
        },

        Signal::AnswersComplete => match current {
            Phase::Questioning => Transition::to(
                Phase::Analyzing(PendingConfirmation),
                vec![Effect::SubmitPolicy],
            ),
            _ => Transition::stay(current),
        },

        Signal::PolicyFailed(message) => match current {
            Phase::Analyzing(PendingConfirmation | AwaitingResult) => Transition::to(
                Phase::Questioning,
                vec![
                    Effect::RewindQuestion,
                    Effect::ReportFailure {
                        step: FailedStep::Policy,
                        message: message.clone(),
                    },
                ],
            ),
            _ => Transition::stay(current),
        },

        Signal::ArtifactsReady => match current {
            Phase::Analyzing(Finalizing) => Transition::to(Phase::Complete, vec![Effect::Render]),
            _ => Transition::stay(current),
        },

        Signal::FinalizeFailed { step, message } => match current {
            Phase::Analyzing(Finalizing) => Transition::to(
                Phase::Analyzing(Halted),
                vec![Effect::ReportFailure {
                    step: *step,
                    message: message.clone(),
                }],
            ),
            _ => Transition::stay(current),
        },

        Signal::RetryFinalize => match current {
            Phase::Analyzing(Halted) => Transition::to(
                Phase::Analyzing(Finalizing),
                vec![Effect::FinalizeArtifacts],
            ),
            _ => Transition::stay(current),
        },

        Signal::Acknowledge => match current {
            Phase::Analyzing(Halted) => {
                Transition::to(Phase::Welcome, vec![Effect::ResetSession])
            }
            _ => Transition::stay(current),
        },
    }
}

fn server_transition(current: Phase, server: ServerPhase) -> Transition {
    use AnalyzingStage::*;

    // The server re-announces its current phase after every reconnect.
    if current.corresponds_to(server) {
        return match (current, server) {
            (Phase::Analyzing(PendingConfirmation), ServerPhase::Analyzing) => {
                Transition::to(Phase::Analyzing(AwaitingResult), vec![Effect::AwaitResult])
            }
            _ => Transition::stay(current),
        };
    }

    // Until the analysis starts the server still reports the questions
    if current == Phase::Analyzing(PendingConfirmation) && server == ServerPhase::Questioning {
        return Transition::stay(current);
    }

    match server {
        ServerPhase::Uploading => Transition::to(Phase::Uploading, Vec::new()),
        ServerPhase::Processing => Transition::to(Phase::Processing, vec![Effect::ResetProgress]),
        ServerPhase::Questioning => {
            Transition::to(Phase::Questioning, vec![Effect::StartQuestioning])
        }
        ServerPhase::Analyzing => {
            Transition::to(Phase::Analyzing(AwaitingResult), vec![Effect::AwaitResult])
        }
        ServerPhase::Complete => match current {
            Phase::Analyzing(PendingConfirmation | AwaitingResult) => Transition::to(
                Phase::Analyzing(Finalizing),
                vec![Effect::FinalizeArtifacts],
            ),
            Phase::Analyzing(Finalizing | Halted) => Transition::stay(current),
            _ => Transition::to(Phase::Complete, vec![Effect::Render]),
        },
        ServerPhase::Error => Transition::to(Phase::Error, vec![Effect::SurfaceServerError]),
    }
}

/// Applies `signal` to the context and returns the effects to execute.
///
/// This is the only place where the phase of a session changes.
pub fn apply(context: &mut SessionContext, signal: &Signal) -> Vec<Effect> {
    let current = context.phase();
    let Transition { next, effects } = transition(current, signal);

    if next != current {
        info!(
            session_id = %context.session_id(),
            from = %current,
            to = %next,
            "Phase changed"
        );
        context.set_phase(next);
    } else if effects.is_empty() {
        debug!(phase = %current, signal = ?signal, "Signal ignored");
    }

    effects
}
