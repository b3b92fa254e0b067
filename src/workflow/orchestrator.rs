use crate::api::BackendApi;
use crate::controllers::{
    AnalysisController, AnswerOutcome, Question, QuestioningController, ScopingInsight,
    UploadController, UploadOutcome, UploadRequest,
};
use crate::events::{
    Event, EventStreamClient, EventTransport, RetryPolicy, StreamError, StreamMessage,
    StreamStatus,
};
use crate::machine::{apply, Effect, FailedStep, Signal};
use crate::notice::{NoOpHandler, NoticeHandler, WorkflowNotice};
use crate::session::{AnalyzingStage, Phase, SessionContext, SessionId};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Something the user did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Answer to the pending question; an empty string skips it.
    /// Answers given before the questions start are kept for them.
    Answer(String),
    /// Dismiss a finished or failed session
    Acknowledge,
    /// Run the failed analysis fetch or document generation again
    Retry,
    /// No more user input will arrive
    EndOfInput,
}

/// One item of the orchestrator's input queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowInput {
    Stream(StreamMessage),
    User(UserAction),
}

impl From<StreamMessage> for WorkflowInput {
    fn from(message: StreamMessage) -> Self {
        WorkflowInput::Stream(message)
    }
}

impl From<UserAction> for WorkflowInput {
    fn from(action: UserAction) -> Self {
        WorkflowInput::User(action)
    }
}

impl From<Event> for WorkflowInput {
    fn from(event: Event) -> Self {
        WorkflowInput::Stream(StreamMessage::Event(event))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Upload failed: {message}")]
    UploadFailed { message: String },

    #[error("The server reported an error for this session")]
    ServerError,

    #[error("Lost the event stream after {attempts} connection attempts")]
    ConnectionLost { attempts: u32 },

    #[error("The {step} failed: {message}")]
    FinalizeFailed { step: FailedStep, message: String },

    #[error("Input ended while an answer was still needed")]
    InputClosed,

    #[error("No failed step to retry in phase {phase}")]
    NothingToRetry { phase: Phase },

    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Drives one session from upload to the generated document
pub struct Workflow<B: ?Sized, T> {
    backend: Arc<B>,
    transport: Arc<T>,
    policy: RetryPolicy,
    stream: EventStreamClient<T>,
    context: SessionContext,
    upload: UploadController,
    questioning: QuestioningController,
    analysis: AnalysisController,
    notices: Arc<dyn NoticeHandler>,
    input_tx: mpsc::UnboundedSender<WorkflowInput>,
    input_rx: mpsc::UnboundedReceiver<WorkflowInput>,
    pending_upload: Option<UploadRequest>,
    /// Answers received before the first question was asked
    typed_ahead: VecDeque<String>,
    input_ended: bool,
    exit: Option<Result<(), WorkflowError>>,
}

impl<B, T> Workflow<B, T>
where
    B: BackendApi + ?Sized,
    T: EventTransport + 'static,
{
    pub fn new(
        backend: Arc<B>,
        transport: Arc<T>,
        session_id: SessionId,
        policy: RetryPolicy,
    ) -> Self {
        let questioning = QuestioningController::default();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        Self {
            stream: EventStreamClient::new(Arc::clone(&transport), policy),
            context: SessionContext::new(session_id, questioning.len()),
            backend,
            transport,
            policy,
            upload: UploadController::default(),
            questioning,
            analysis: AnalysisController::new(),
            notices: Arc::new(NoOpHandler),
            input_tx,
            input_rx,
            pending_upload: None,
            typed_ahead: VecDeque::new(),
            input_ended: false,
            exit: None,
        }
    }

    pub fn with_questions(mut self, questions: Vec<Question>) -> Self {
        self.context = SessionContext::new(self.context.session_id().clone(), questions.len());
        self.questioning = QuestioningController::new(questions);
        self
    }

    pub fn with_max_upload_bytes(mut self, max_bytes: u64) -> Self {
        self.upload = UploadController::new(max_bytes);
        self
    }

    pub fn with_notice_handler(mut self, handler: Arc<dyn NoticeHandler>) -> Self {
        self.notices = handler;
        self
    }

    /// Sender for user actions; the stream client writes into the same queue
    pub fn input_sender(&self) -> mpsc::UnboundedSender<WorkflowInput> {
        self.input_tx.clone()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn questions(&self) -> &[Question] {
        self.questioning.questions()
    }

    pub fn stream_status(&self) -> StreamStatus {
        self.stream.status()
    }

    /// Submits `request` and processes inputs until the session settles.
    ///
    /// Returns `Ok` once the session is complete. Collected data stays in
    /// [`Workflow::context`] whatever the outcome.
    pub async fn run(&mut self, request: UploadRequest) -> Result<(), WorkflowError> {
        self.exit = None;
        self.pending_upload = Some(request);
        self.dispatch(Signal::FileSubmitted).await;

        loop {
            if let Some(result) = self.exit.take() {
                return result;
            }
            let Some(input) = self.input_rx.recv().await else {
                return Err(WorkflowError::InputClosed);
            };
            self.handle(input).await;
        }
    }

    /// Processes a single input, including every effect it triggers
    pub async fn handle(&mut self, input: WorkflowInput) {
        match input {
            WorkflowInput::Stream(StreamMessage::Event(event)) => match Signal::from_event(&event)
            {
                Some(signal) => self.dispatch(signal).await,
                None => debug!(event = event.name(), "Event carries no signal"),
            },
            WorkflowInput::Stream(StreamMessage::ConnectionFailed { attempts }) => {
                self.notify(WorkflowNotice::ConnectionFailed { attempts });
                self.settle(Err(WorkflowError::ConnectionLost { attempts }));
            }
            WorkflowInput::User(UserAction::Answer(text)) => self.answer(text).await,
            WorkflowInput::User(UserAction::Acknowledge) => {
                self.dispatch(Signal::Acknowledge).await
            }
            WorkflowInput::User(UserAction::Retry) => self.dispatch(Signal::RetryFinalize).await,
            WorkflowInput::User(UserAction::EndOfInput) => {
                self.input_ended = true;
                if self.questioning.current().is_some() {
                    self.settle(Err(WorkflowError::InputClosed));
                }
            }
        }
    }

    /// Dismisses a terminal session or a halted analysis and returns to the
    /// welcome phase
    pub async fn acknowledge(&mut self) {
        self.dispatch(Signal::Acknowledge).await;
    }

    /// Runs a halted analysis fetch or document generation again.
    ///
    /// Returns the outcome of the new attempt; a second failure halts again.
    pub async fn retry_finalize(&mut self) -> Result<(), WorkflowError> {
        let phase = self.context.phase();
        if phase != Phase::Analyzing(AnalyzingStage::Halted) {
            return Err(WorkflowError::NothingToRetry { phase });
        }
        self.exit = None;
        self.dispatch(Signal::RetryFinalize).await;
        self.exit.take().unwrap_or(Ok(()))
    }

    /// Closes the event stream. The context is kept.
    pub async fn shutdown(&mut self) {
        self.stream.close().await;
    }

    async fn answer(&mut self, text: String) {
        match self.context.phase() {
            Phase::Questioning if self.questioning.current().is_some() => {}
            Phase::Welcome | Phase::Uploading | Phase::Processing => {
                self.typed_ahead.push_back(text);
                debug!(
                    queued = self.typed_ahead.len(),
                    "Keeping answer until the questions start"
                );
                return;
            }
            phase => {
                warn!(phase = %phase, "No question is pending, ignoring answer");
                return;
            }
        }

        match self.questioning.submit(&mut self.context, &text) {
            Ok(AnswerOutcome::Next(_)) => self.ask_current(),
            Ok(AnswerOutcome::Completed) => self.dispatch(Signal::AnswersComplete).await,
            Err(e) => {
                self.notify(WorkflowNotice::AnswerRejected {
                    reason: e.to_string(),
                });
                self.ask_current();
            }
        }
    }

    /// Applies `signal` and executes its effects. Controller results are
    /// queued as further signals and handled before returning.
    async fn dispatch(&mut self, signal: Signal) {
        let mut queue = VecDeque::from([signal]);

        while let Some(signal) = queue.pop_front() {
            let from = self.context.phase();
            let effects = apply(&mut self.context, &signal);
            let to = self.context.phase();
            if from != to {
                self.notify(WorkflowNotice::PhaseChanged { from, to });
            }

            for effect in effects {
                if let Some(next) = self.execute(effect).await {
                    queue.push_back(next);
                }
            }
        }
    }

    async fn execute(&mut self, effect: Effect) -> Option<Signal> {
        match effect {
            Effect::SubmitUpload => {
                let Some(request) = self.pending_upload.take() else {
                    return Some(Signal::UploadFailed("no file selected".to_string()));
                };
                self.notify(WorkflowNotice::UploadStarted {
                    file_name: request.file_name(),
                });
                let result = self
                    .upload
                    .submit(self.backend.as_ref(), &mut self.context, &request)
                    .await;
                Some(match result {
                    Ok(UploadOutcome::Monitor) => Signal::UploadAccepted { monitor: true },
                    Ok(UploadOutcome::Completed) => Signal::UploadAccepted { monitor: false },
                    Err(e) => Signal::UploadFailed(e.user_message()),
                })
            }
            Effect::OpenStream => {
                let sink = self.input_tx.clone();
                if let Err(e) = self.stream.open(self.context.session_id(), sink) {
                    self.settle(Err(e.into()));
                }
                None
            }
            Effect::ResetProgress => {
                self.context.clear_progress();
                None
            }
            Effect::UpdateProgress { step, percent } => {
                self.context.set_progress(step.clone(), percent);
                self.notify(WorkflowNotice::Progress { step, percent });
                None
            }
            Effect::StartQuestioning => {
                if self.questioning.start(&mut self.context).is_none() {
                    return Some(Signal::AnswersComplete);
                }
                if let Some(signal) = self.replay_typed_ahead() {
                    return Some(signal);
                }
                if self.input_ended {
                    self.settle(Err(WorkflowError::InputClosed));
                    return None;
                }
                self.ask_current();
                None
            }
            Effect::ApplyScoping(text) => {
                let insight = ScopingInsight::extract(&text);
                self.context.set_scoping(insight.clone());
                self.notify(WorkflowNotice::ScopingUpdated(insight));
                None
            }
            Effect::AwaitResult => {
                self.notify(WorkflowNotice::AnalysisStarted);
                None
            }
            Effect::SubmitPolicy => {
                match self
                    .questioning
                    .submit_policy(self.backend.as_ref(), &self.context)
                    .await
                {
                    Ok(()) => None,
                    Err(e) => Some(Signal::PolicyFailed(e.user_message())),
                }
            }
            Effect::RewindQuestion => {
                self.questioning.rewind(&mut self.context);
                None
            }
            Effect::FinalizeArtifacts => {
                match self
                    .analysis
                    .finalize(self.backend.as_ref(), &mut self.context)
                    .await
                {
                    Ok(()) => Some(Signal::ArtifactsReady),
                    Err(e) => Some(Signal::FinalizeFailed {
                        step: e.failed_step(),
                        message: e.user_message(),
                    }),
                }
            }
            Effect::Render => {
                self.notify(WorkflowNotice::Completed {
                    document: self.context.generated_document().map(str::to_string),
                    analysis: self.context.video_analysis().map(str::to_string),
                });
                self.settle(Ok(()));
                None
            }
            Effect::ReportFailure { step, message } => {
                self.notify(WorkflowNotice::StepFailed {
                    step,
                    message: message.clone(),
                });
                match step {
                    FailedStep::Upload => {
                        self.settle(Err(WorkflowError::UploadFailed { message }));
                    }
                    FailedStep::FetchAnalysis | FailedStep::GenerateDocument => {
                        self.settle(Err(WorkflowError::FinalizeFailed { step, message }));
                    }
                    FailedStep::Policy => {
                        if self.input_ended {
                            self.settle(Err(WorkflowError::InputClosed));
                        } else {
                            self.ask_current();
                        }
                    }
                }
                None
            }
            Effect::SurfaceServerError => {
                self.notify(WorkflowNotice::ServerError);
                self.settle(Err(WorkflowError::ServerError));
                None
            }
            Effect::ResetSession => {
                self.stream.close().await;
                self.stream = EventStreamClient::new(Arc::clone(&self.transport), self.policy);
                self.context.reset();
                self.pending_upload = None;
                self.typed_ahead.clear();
                self.exit = None;
                info!(session_id = %self.context.session_id(), "Session reset");
                None
            }
        }
    }

    /// Submits the answers received before the first question, in order.
    /// Rejected ones are reported and the same question takes the next answer.
    fn replay_typed_ahead(&mut self) -> Option<Signal> {
        while let Some(text) = self.typed_ahead.pop_front() {
            match self.questioning.submit(&mut self.context, &text) {
                Ok(AnswerOutcome::Next(_)) => {}
                Ok(AnswerOutcome::Completed) => {
                    if !self.typed_ahead.is_empty() {
                        debug!(
                            dropped = self.typed_ahead.len(),
                            "Dropping answers beyond the last question"
                        );
                        self.typed_ahead.clear();
                    }
                    return Some(Signal::AnswersComplete);
                }
                Err(e) => self.notify(WorkflowNotice::AnswerRejected {
                    reason: e.to_string(),
                }),
            }
        }
        None
    }

    fn ask_current(&self) {
        if let (Some(question), Some((index, total))) =
            (self.questioning.current(), self.questioning.position())
        {
            self.notify(WorkflowNotice::QuestionAsked {
                index,
                total,
                question: question.clone(),
            });
        }
    }

    /// Keeps the first outcome of a run
    fn settle(&mut self, result: Result<(), WorkflowError>) {
        if self.exit.is_none() {
            self.exit = Some(result);
        }
    }

    fn notify(&self, notice: WorkflowNotice) {
        self.notices.on_notice(&notice);
    }
}

impl<B: ?Sized, T> std::fmt::Debug for Workflow<B, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("session_id", self.context.session_id())
            .field("phase", &self.context.phase())
            .field("stream", &self.stream)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiOperation, MockBackend};
    use crate::controllers::Question;
    use crate::events::{MockConnection, MockTransport};
    use std::io::Write;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        notices: Mutex<Vec<WorkflowNotice>>,
    }

    impl RecordingHandler {
        fn notices(&self) -> Vec<WorkflowNotice> {
            self.notices.lock().unwrap().clone()
        }
    }

    impl NoticeHandler for RecordingHandler {
        fn on_notice(&self, notice: &WorkflowNotice) {
            self.notices.lock().unwrap().push(notice.clone());
        }
    }

    fn phase(name: &str) -> Event {
        Event::Phase {
            phase: name.to_string(),
        }
    }

    fn video() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        file.write_all(b"not really a video").unwrap();
        file
    }

    fn workflow(
        backend: Arc<MockBackend>,
        transport: Arc<MockTransport>,
    ) -> (Workflow<MockBackend, MockTransport>, Arc<RecordingHandler>) {
        let handler = Arc::new(RecordingHandler::default());
        let workflow = Workflow::new(
            backend,
            transport,
            SessionId::new("workflow-test").unwrap(),
            RetryPolicy::default(),
        )
        .with_notice_handler(handler.clone());
        (workflow, handler)
    }

    #[tokio::test]
    async fn test_complete_upload_skips_monitoring() {
        let backend = Arc::new(
            MockBackend::new().with_upload_status(crate::api::UploadStatus::Complete),
        );
        let transport = Arc::new(MockTransport::new());
        let (mut workflow, _) = workflow(backend.clone(), transport.clone());
        let file = video();

        workflow.run(UploadRequest::new(file.path())).await.unwrap();

        assert_eq!(workflow.context().phase(), Phase::Complete);
        assert_eq!(transport.connect_count(), 0);
        assert_eq!(backend.operations(), vec![ApiOperation::SubmitFile]);
    }

    #[tokio::test]
    async fn test_upload_failure_returns_to_welcome() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next(ApiOperation::SubmitFile, 400, "unsupported format");
        let (mut workflow, handler) = workflow(backend, Arc::new(MockTransport::new()));
        let file = video();

        let err = workflow.run(UploadRequest::new(file.path())).await.unwrap_err();

        assert_eq!(
            err,
            WorkflowError::UploadFailed {
                message: "unsupported format".to_string()
            }
        );
        assert_eq!(workflow.context().phase(), Phase::Welcome);
        assert!(workflow.context().metadata().is_none());
        assert!(handler.notices().contains(&WorkflowNotice::StepFailed {
            step: FailedStep::Upload,
            message: "unsupported format".to_string()
        }));
    }

    #[tokio::test]
    async fn test_answers_ignored_after_questioning() {
        let backend = Arc::new(MockBackend::new());
        let (workflow, handler) = workflow(backend.clone(), Arc::new(MockTransport::new()));
        let mut workflow =
            workflow.with_questions(vec![Question::free_text("topic", "What?", "")]);

        workflow.handle(phase("questioning").into()).await;
        workflow
            .handle(UserAction::Answer("請求".to_string()).into())
            .await;
        let notices = handler.notices().len();

        workflow
            .handle(UserAction::Answer("late".to_string()).into())
            .await;

        assert_eq!(workflow.context().answers().len(), 1);
        assert_eq!(handler.notices().len(), notices);
        assert_eq!(backend.count(ApiOperation::UpdatePolicy), 1);
    }

    #[tokio::test]
    async fn test_questioning_reannounced_after_answers_keeps_them() {
        let backend = Arc::new(MockBackend::new());
        let (workflow, handler) = workflow(backend.clone(), Arc::new(MockTransport::new()));
        let mut workflow =
            workflow.with_questions(vec![Question::free_text("topic", "What?", "")]);

        workflow.handle(phase("questioning").into()).await;
        workflow
            .handle(UserAction::Answer("請求".to_string()).into())
            .await;
        let asked = handler.notices().len();

        // A reconnect before the analysis starts announces questioning again
        workflow.handle(phase("questioning").into()).await;

        assert_eq!(
            workflow.context().phase(),
            Phase::Analyzing(AnalyzingStage::PendingConfirmation)
        );
        assert_eq!(workflow.context().answers().len(), 1);
        assert_eq!(handler.notices().len(), asked);
        assert_eq!(backend.count(ApiOperation::UpdatePolicy), 1);
    }

    #[tokio::test]
    async fn test_answers_before_questioning_are_kept() {
        let backend = Arc::new(MockBackend::new());
        let (mut workflow, handler) = workflow(backend.clone(), Arc::new(MockTransport::new()));

        workflow.handle(phase("processing").into()).await;
        for answer in ["月次請求", "", "9", "新入社員", "標準", "extra"] {
            workflow
                .handle(UserAction::Answer(answer.to_string()).into())
                .await;
        }
        assert!(workflow.context().answers().is_empty());

        workflow.handle(phase("questioning").into()).await;

        let answers: Vec<_> = workflow
            .context()
            .answers()
            .iter()
            .map(|a| a.text.as_str())
            .collect();
        assert_eq!(answers, ["月次請求", "", "新入社員", "標準"]);
        assert_eq!(
            workflow.context().phase(),
            Phase::Analyzing(AnalyzingStage::PendingConfirmation)
        );
        assert_eq!(
            backend.operations(),
            vec![ApiOperation::UpdatePolicy, ApiOperation::StartAnalysis]
        );

        let notices = handler.notices();
        assert!(!notices
            .iter()
            .any(|n| matches!(n, WorkflowNotice::QuestionAsked { .. })));
        assert_eq!(
            notices
                .iter()
                .filter(|n| matches!(n, WorkflowNotice::AnswerRejected { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_partial_answers_before_questioning_then_ask() {
        let (mut workflow, handler) =
            workflow(Arc::new(MockBackend::new()), Arc::new(MockTransport::new()));

        workflow
            .handle(UserAction::Answer("月次請求".to_string()).into())
            .await;
        workflow.handle(phase("questioning").into()).await;

        assert_eq!(workflow.context().answers().len(), 1);
        assert!(matches!(
            handler.notices().last(),
            Some(WorkflowNotice::QuestionAsked { index: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_without_questions_policy_is_sent_immediately() {
        let backend = Arc::new(MockBackend::new());
        let (workflow, _) = workflow(backend.clone(), Arc::new(MockTransport::new()));
        let mut workflow = workflow.with_questions(Vec::new());

        workflow.handle(phase("questioning").into()).await;
        assert_eq!(
            workflow.context().phase(),
            Phase::Analyzing(crate::session::AnalyzingStage::PendingConfirmation)
        );

        workflow.handle(phase("complete").into()).await;
        assert_eq!(workflow.context().phase(), Phase::Complete);
        assert_eq!(
            backend.operations(),
            vec![
                ApiOperation::UpdatePolicy,
                ApiOperation::StartAnalysis,
                ApiOperation::FetchAnalysis,
                ApiOperation::GenerateDocument,
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_answer_is_rejected_and_reasked() {
        let backend = Arc::new(MockBackend::new());
        let (workflow, handler) = workflow(backend.clone(), Arc::new(MockTransport::new()));
        let mut workflow = workflow.with_questions(vec![Question::single_choice(
            "tool",
            "Which tool?",
            &["Excel", "SAP"],
        )]);

        workflow.handle(phase("questioning").into()).await;
        workflow
            .handle(UserAction::Answer("Word".to_string()).into())
            .await;
        assert_eq!(workflow.context().phase(), Phase::Questioning);
        assert!(workflow.context().answers().is_empty());

        workflow
            .handle(UserAction::Answer("2".to_string()).into())
            .await;
        assert_eq!(workflow.context().answers()[0].text, "SAP");
        assert_eq!(
            backend.operations(),
            vec![ApiOperation::UpdatePolicy, ApiOperation::StartAnalysis]
        );

        let notices = handler.notices();
        let asked = notices
            .iter()
            .filter(|n| matches!(n, WorkflowNotice::QuestionAsked { .. }))
            .count();
        assert_eq!(asked, 2);
        assert!(notices
            .iter()
            .any(|n| matches!(n, WorkflowNotice::AnswerRejected { .. })));
    }

    #[tokio::test]
    async fn test_policy_failure_reasks_last_question() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next(ApiOperation::StartAnalysis, 503, "analysis busy");
        let (workflow, handler) = workflow(backend.clone(), Arc::new(MockTransport::new()));
        let mut workflow =
            workflow.with_questions(vec![Question::free_text("topic", "What?", "")]);

        workflow.handle(phase("questioning").into()).await;
        workflow
            .handle(UserAction::Answer("請求".to_string()).into())
            .await;

        assert_eq!(workflow.context().phase(), Phase::Questioning);
        assert!(workflow.context().answers().is_empty());
        assert!(matches!(
            handler.notices().last(),
            Some(WorkflowNotice::QuestionAsked { index: 0, .. })
        ));

        workflow
            .handle(UserAction::Answer("請求".to_string()).into())
            .await;
        assert_eq!(backend.count(ApiOperation::StartAnalysis), 2);
    }

    #[tokio::test]
    async fn test_end_of_input_before_question_closes_run() {
        let transport = Arc::new(MockTransport::with_script([MockConnection::events_then_hold(
            [phase("questioning")],
        )]));
        let (mut workflow, _) = workflow(Arc::new(MockBackend::new()), transport);
        let sender = workflow.input_sender();
        let file = video();

        sender.send(UserAction::EndOfInput.into()).unwrap();
        let err = workflow.run(UploadRequest::new(file.path())).await.unwrap_err();

        assert_eq!(err, WorkflowError::InputClosed);
        assert_eq!(workflow.context().phase(), Phase::Questioning);
        workflow.shutdown().await;
    }

    async fn halted_workflow(
        backend: Arc<MockBackend>,
    ) -> (Workflow<MockBackend, MockTransport>, Arc<RecordingHandler>) {
        backend.fail_next(ApiOperation::GenerateDocument, 500, "model overloaded");
        let (workflow, handler) = workflow(backend, Arc::new(MockTransport::new()));
        let mut workflow = workflow.with_questions(Vec::new());

        workflow.handle(phase("questioning").into()).await;
        workflow.handle(phase("complete").into()).await;
        assert_eq!(
            workflow.context().phase(),
            Phase::Analyzing(AnalyzingStage::Halted)
        );
        (workflow, handler)
    }

    #[tokio::test]
    async fn test_halted_document_generation_can_be_retried() {
        let backend = Arc::new(MockBackend::new().with_document("# 引継ぎ資料"));
        let (mut workflow, handler) = halted_workflow(backend.clone()).await;

        workflow.retry_finalize().await.unwrap();

        assert_eq!(workflow.context().phase(), Phase::Complete);
        assert_eq!(workflow.context().generated_document(), Some("# 引継ぎ資料"));
        assert_eq!(backend.count(ApiOperation::FetchAnalysis), 1);
        assert_eq!(backend.count(ApiOperation::GenerateDocument), 2);
        assert!(matches!(
            handler.notices().last(),
            Some(WorkflowNotice::Completed { document: Some(_), .. })
        ));
        assert_eq!(
            workflow.retry_finalize().await,
            Err(WorkflowError::NothingToRetry {
                phase: Phase::Complete
            })
        );
    }

    #[tokio::test]
    async fn test_failed_retry_halts_again() {
        let backend = Arc::new(MockBackend::new());
        let (mut workflow, _) = halted_workflow(backend.clone()).await;
        backend.fail_next(ApiOperation::GenerateDocument, 502, "bad gateway");

        let err = workflow.retry_finalize().await.unwrap_err();

        assert_eq!(
            err,
            WorkflowError::FinalizeFailed {
                step: FailedStep::GenerateDocument,
                message: "bad gateway".to_string()
            }
        );
        assert_eq!(
            workflow.context().phase(),
            Phase::Analyzing(AnalyzingStage::Halted)
        );
    }

    #[tokio::test]
    async fn test_retry_action_from_input_queue() {
        let backend = Arc::new(MockBackend::new());
        let (mut workflow, _) = halted_workflow(backend.clone()).await;

        workflow.handle(UserAction::Retry.into()).await;

        assert_eq!(workflow.context().phase(), Phase::Complete);
        assert_eq!(backend.count(ApiOperation::GenerateDocument), 2);
    }

    #[tokio::test]
    async fn test_acknowledge_dismisses_halted_analysis() {
        let backend = Arc::new(MockBackend::new());
        let (mut workflow, _) = halted_workflow(backend.clone()).await;

        workflow.acknowledge().await;

        assert_eq!(workflow.context().phase(), Phase::Welcome);
        assert!(workflow.context().video_analysis().is_none());
        assert!(workflow.context().answers().is_empty());
    }

    #[tokio::test]
    async fn test_acknowledge_resets_terminal_session() {
        let (mut workflow, _) =
            workflow(Arc::new(MockBackend::new()), Arc::new(MockTransport::new()));

        workflow.handle(phase("error").into()).await;
        assert_eq!(workflow.context().phase(), Phase::Error);

        workflow.acknowledge().await;
        assert_eq!(workflow.context().phase(), Phase::Welcome);
        assert_eq!(workflow.stream_status(), StreamStatus::Idle);
    }
}
