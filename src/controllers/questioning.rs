//! Fixed question list and answer collection
//!
//! Exactly one question is pending at a time. Answers are stored in question
//! order; once the last one is in, the answers are serialized into the policy
//! document and sent to the server.

use crate::api::{ApiError, BackendApi};
use crate::session::{Answer, ContextError, SessionContext};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    FreeText { placeholder: String },
    SingleChoice { options: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub kind: QuestionKind,
    /// An empty answer is accepted
    pub skippable: bool,
}

impl Question {
    pub fn free_text(id: &str, prompt: &str, placeholder: &str) -> Self {
        Self {
            id: id.to_string(),
            prompt: prompt.to_string(),
            kind: QuestionKind::FreeText {
                placeholder: placeholder.to_string(),
            },
            skippable: true,
        }
    }

    pub fn single_choice(id: &str, prompt: &str, options: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            prompt: prompt.to_string(),
            kind: QuestionKind::SingleChoice {
                options: options.iter().map(|o| o.to_string()).collect(),
            },
            skippable: true,
        }
    }

    pub fn required(mut self) -> Self {
        self.skippable = false;
        self
    }

    /// Validates `input` and returns the text to store.
    ///
    /// Choices may be given as the option text (case-insensitive) or as its
    /// 1-based number; the option text is stored either way.
    pub fn normalize(&self, input: &str) -> Result<String, AnswerError> {
        let input = input.trim();
        if input.is_empty() {
            return if self.skippable {
                Ok(String::new())
            } else {
                Err(AnswerError::Required {
                    question_id: self.id.clone(),
                })
            };
        }

        match &self.kind {
            QuestionKind::FreeText { .. } => Ok(input.to_string()),
            QuestionKind::SingleChoice { options } => {
                let by_number = input
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|index| options.get(index));
                let by_text = || {
                    options
                        .iter()
                        .find(|option| option.to_lowercase() == input.to_lowercase())
                };
                by_number
                    .or_else(by_text)
                    .cloned()
                    .ok_or_else(|| AnswerError::InvalidChoice {
                        question_id: self.id.clone(),
                        answer: input.to_string(),
                        options: options.len(),
                    })
            }
        }
    }
}

/// The questions asked after the server has scoped the recording
pub fn default_questions() -> Vec<Question> {
    vec![
        Question::free_text(
            "business_type",
            "この動画は何の業務についてですか？",
            "例: 月次請求書の処理フロー",
        ),
        Question::free_text(
            "focus_points",
            "特に重点的に説明してほしい箇所はありますか？",
            "例: エラー時の対応手順、承認フローの詳細",
        ),
        Question::single_choice(
            "handover_target",
            "引継ぎ先の方はどんな方ですか？",
            &["新入社員", "他部署からの異動者", "同じチームの後任者", "外部の委託先"],
        ),
        Question::single_choice(
            "detail_level",
            "資料はどの程度詳しく作成しますか？",
            &["要点のみ", "標準", "操作手順まで詳細に"],
        )
        .required(),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("No question is waiting for an answer")]
    NoPendingQuestion,

    #[error("Question '{question_id}' cannot be skipped")]
    Required { question_id: String },

    #[error("'{answer}' is not an option for '{question_id}' (choose 1-{options} or the option text)")]
    InvalidChoice {
        question_id: String,
        answer: String,
        options: usize,
    },

    #[error(transparent)]
    Context(#[from] ContextError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Index of the question that is now pending
    Next(usize),
    /// The last question was answered
    Completed,
}

/// Renders the answers as the policy document sent to the server.
///
/// One `[question_id]` line followed by the answer per question, in question
/// order, sections separated by a blank line.
pub fn policy_document(questions: &[Question], answers: &[Answer]) -> String {
    questions
        .iter()
        .map(|question| {
            let text = answers
                .iter()
                .find(|answer| answer.question_id == question.id)
                .map(|answer| answer.text.as_str())
                .unwrap_or_default();
            format!("[{}]\n{}", question.id, text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone)]
pub struct QuestioningController {
    questions: Vec<Question>,
    cursor: Option<usize>,
}

impl Default for QuestioningController {
    fn default() -> Self {
        Self::new(default_questions())
    }
}

impl QuestioningController {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions,
            cursor: None,
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Clears previous answers and puts the cursor on the first question.
    ///
    /// Returns `None` when there is nothing to ask.
    pub fn start(&mut self, context: &mut SessionContext) -> Option<&Question> {
        context.clear_answers();
        self.cursor = (!self.questions.is_empty()).then_some(0);
        debug!(questions = self.questions.len(), "Questioning started");
        self.current()
    }

    pub fn current(&self) -> Option<&Question> {
        self.cursor.and_then(|index| self.questions.get(index))
    }

    /// `(index, total)` of the pending question
    pub fn position(&self) -> Option<(usize, usize)> {
        self.cursor.map(|index| (index, self.questions.len()))
    }

    pub fn submit(
        &mut self,
        context: &mut SessionContext,
        input: &str,
    ) -> Result<AnswerOutcome, AnswerError> {
        let index = self.cursor.ok_or(AnswerError::NoPendingQuestion)?;
        let question = self
            .questions
            .get(index)
            .ok_or(AnswerError::NoPendingQuestion)?;

        let text = question.normalize(input)?;
        context.push_answer(Answer::new(question.id.clone(), text))?;

        if index + 1 >= self.questions.len() {
            self.cursor = None;
            Ok(AnswerOutcome::Completed)
        } else {
            self.cursor = Some(index + 1);
            Ok(AnswerOutcome::Next(index + 1))
        }
    }

    /// Removes the last answer and makes its question pending again
    pub fn rewind(&mut self, context: &mut SessionContext) -> Option<&Question> {
        context.pop_answer();
        self.cursor = match self.questions.len() {
            0 => None,
            len => Some(context.answers().len().min(len - 1)),
        };
        self.current()
    }

    /// Sends the policy document, then starts the analysis
    pub async fn submit_policy<B>(
        &self,
        backend: &B,
        context: &SessionContext,
    ) -> Result<(), ApiError>
    where
        B: BackendApi + ?Sized,
    {
        let policy = policy_document(&self.questions, context.answers());
        backend.update_policy(context.session_id(), &policy).await?;
        info!(session_id = %context.session_id(), "Policy submitted, starting analysis");
        backend.start_analysis(context.session_id()).await
    }
}
