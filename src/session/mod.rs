//! Session identity, phase values and the per-run session context

pub mod context;
pub mod phase;

pub use context::{
    Answer, ContextError, ProgressState, SessionContext, SessionId, SessionSummary,
    UploadMetadata,
};
pub use phase::{AnalyzingStage, Phase, ServerPhase, UnknownPhase};
