//! Session context: the one record a workflow run operates on
//!
//! The orchestrator owns the only [`SessionContext`] of a run and passes it by
//! reference to the controllers. The phase is changed exclusively through the
//! phase machine (`crate::machine::apply`); everything else is per-run data that
//! the controllers fold responses into.

use super::phase::Phase;
use crate::controllers::scoping::ScopingInsight;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Invalid session id {0:?}: must be non-empty without whitespace or '/'")]
    InvalidSessionId(String),

    #[error("All {capacity} answers are already recorded")]
    AnswersFull { capacity: usize },

    #[error("{0} is already stored for this run")]
    ArtifactAlreadySet(&'static str),
}

/// Opaque session identifier, also used as a URL path segment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContextError> {
        let id = id.into();
        if id.is_empty() || id.contains('/') || id.chars().any(char::is_whitespace) {
            return Err(ContextError::InvalidSessionId(id));
        }
        Ok(Self(id))
    }

    /// Random v4 UUID, the same shape the server hands out to browser sessions
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub question_id: String,
    pub text: String,
}

impl Answer {
    pub fn new(question_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            text: text.into(),
        }
    }
}

/// Latest `progress` event received while processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub step: String,
    pub percent: u8,
}

/// Metadata sent along with the uploaded file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadMetadata {
    pub file_name: String,
    pub business_title: String,
    pub author_name: String,
    pub additional_notes: String,
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    session_id: SessionId,
    phase: Phase,
    answers: Vec<Answer>,
    answer_capacity: usize,
    video_analysis: Option<String>,
    generated_document: Option<String>,
    progress: Option<ProgressState>,
    scoping: Option<ScopingInsight>,
    metadata: Option<UploadMetadata>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionContext {
    /// Creates a context in `Welcome` that accepts at most `answer_capacity` answers
    pub fn new(session_id: SessionId, answer_capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            phase: Phase::Welcome,
            answers: Vec::with_capacity(answer_capacity),
            answer_capacity,
            video_analysis: None,
            generated_document: None,
            progress: None,
            scoping: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Only the phase machine calls this.
    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.touch();
    }

    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    pub fn answer_capacity(&self) -> usize {
        self.answer_capacity
    }

    pub fn push_answer(&mut self, answer: Answer) -> Result<(), ContextError> {
        if self.answers.len() >= self.answer_capacity {
            return Err(ContextError::AnswersFull {
                capacity: self.answer_capacity,
            });
        }
        self.answers.push(answer);
        self.touch();
        Ok(())
    }

    pub fn pop_answer(&mut self) -> Option<Answer> {
        let answer = self.answers.pop();
        self.touch();
        answer
    }

    pub fn clear_answers(&mut self) {
        self.answers.clear();
        self.touch();
    }

    pub fn video_analysis(&self) -> Option<&str> {
        self.video_analysis.as_deref()
    }

    pub fn store_video_analysis(&mut self, analysis: String) -> Result<(), ContextError> {
        if self.video_analysis.is_some() {
            return Err(ContextError::ArtifactAlreadySet("video analysis"));
        }
        self.video_analysis = Some(analysis);
        self.touch();
        Ok(())
    }

    pub fn generated_document(&self) -> Option<&str> {
        self.generated_document.as_deref()
    }

    pub fn store_generated_document(&mut self, document: String) -> Result<(), ContextError> {
        if self.generated_document.is_some() {
            return Err(ContextError::ArtifactAlreadySet("generated document"));
        }
        self.generated_document = Some(document);
        self.touch();
        Ok(())
    }

    pub fn progress(&self) -> Option<&ProgressState> {
        self.progress.as_ref()
    }

    pub fn set_progress(&mut self, step: impl Into<String>, percent: u8) {
        self.progress = Some(ProgressState {
            step: step.into(),
            percent: percent.min(100),
        });
        self.touch();
    }

    pub fn clear_progress(&mut self) {
        self.progress = None;
        self.touch();
    }

    pub fn scoping(&self) -> Option<&ScopingInsight> {
        self.scoping.as_ref()
    }

    pub fn set_scoping(&mut self, insight: ScopingInsight) {
        self.scoping = Some(insight);
        self.touch();
    }

    pub fn metadata(&self) -> Option<&UploadMetadata> {
        self.metadata.as_ref()
    }

    pub fn set_metadata(&mut self, metadata: UploadMetadata) {
        self.metadata = Some(metadata);
        self.touch();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Drops all per-run data. Identity and phase are untouched.
    pub fn reset(&mut self) {
        self.answers.clear();
        self.video_analysis = None;
        self.generated_document = None;
        self.progress = None;
        self.scoping = None;
        self.metadata = None;
        self.touch();
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            phase: self.phase,
            metadata: self.metadata.clone(),
            answers: self.answers.clone(),
            scoping: self.scoping.clone(),
            video_analysis: self.video_analysis.clone(),
            generated_document: self.generated_document.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Serializable snapshot of a session, used for CLI output
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<UploadMetadata>,
    pub answers: Vec<Answer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoping: Option<ScopingInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_document: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
