//! Phase values of a handover session
//!
//! [`Phase`] is the client-side macro-state of a session. It mirrors the phases
//! the server announces on the push channel ([`ServerPhase`]) and adds the
//! client-only `Welcome` state plus explicit sub-states for `Analyzing`.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sub-state of [`Phase::Analyzing`]
///
/// The completion signal behaves differently depending on this sub-state, so it
/// is tracked here instead of being inferred from whatever the UI shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzingStage {
    /// Answers were submitted; the server has not announced `analyzing` yet
    PendingConfirmation,
    /// The server is running the analysis
    AwaitingResult,
    /// Fetching the analysis and generating the document
    Finalizing,
    /// Fetch or generation failed; nothing is retried automatically
    Halted,
}

impl fmt::Display for AnalyzingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnalyzingStage::PendingConfirmation => "pending confirmation",
            AnalyzingStage::AwaitingResult => "awaiting result",
            AnalyzingStage::Finalizing => "finalizing",
            AnalyzingStage::Halted => "halted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Welcome,
    Uploading,
    Processing,
    Questioning,
    Analyzing(AnalyzingStage),
    Complete,
    Error,
}

impl Phase {
    /// Complete and Error accept no push signals; only an acknowledgement leaves them
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self, Phase::Analyzing(_))
    }

    /// Whether this phase is the one the server names, ignoring sub-states
    pub fn corresponds_to(&self, server: ServerPhase) -> bool {
        matches!(
            (self, server),
            (Phase::Uploading, ServerPhase::Uploading)
                | (Phase::Processing, ServerPhase::Processing)
                | (Phase::Questioning, ServerPhase::Questioning)
                | (Phase::Analyzing(_), ServerPhase::Analyzing)
                | (Phase::Complete, ServerPhase::Complete)
                | (Phase::Error, ServerPhase::Error)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Welcome => f.write_str("welcome"),
            Phase::Uploading => f.write_str("uploading"),
            Phase::Processing => f.write_str("processing"),
            Phase::Questioning => f.write_str("questioning"),
            Phase::Analyzing(stage) => write!(f, "analyzing ({})", stage),
            Phase::Complete => f.write_str("complete"),
            Phase::Error => f.write_str("error"),
        }
    }
}

/// Phase names the server announces in `phase` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerPhase {
    Uploading,
    Processing,
    Questioning,
    Analyzing,
    Complete,
    Error,
}

impl ServerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerPhase::Uploading => "uploading",
            ServerPhase::Processing => "processing",
            ServerPhase::Questioning => "questioning",
            ServerPhase::Analyzing => "analyzing",
            ServerPhase::Complete => "complete",
            ServerPhase::Error => "error",
        }
    }
}

impl fmt::Display for ServerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase name the client does not know
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown phase signal: {0:?}")]
pub struct UnknownPhase(pub String);

impl FromStr for ServerPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "uploading" => Ok(ServerPhase::Uploading),
            "processing" => Ok(ServerPhase::Processing),
            "questioning" => Ok(ServerPhase::Questioning),
            "analyzing" => Ok(ServerPhase::Analyzing),
            "complete" => Ok(ServerPhase::Complete),
            "error" => Ok(ServerPhase::Error),
            _ => Err(UnknownPhase(s.to_string())),
        }
    }
}
