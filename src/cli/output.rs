//! Output formatting for multiple formats
//!
//! [`OutputFormatter`] renders results for stdout as JSON, YAML or
//! human-readable text. [`TerminalHandler`] shows workflow notices on stderr
//! while a session runs.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

use crate::api::SessionStatus;
use crate::config::ClientConfig;
use crate::controllers::{Extracted, Question, QuestionKind, ScopingInsight};
use crate::notice::{NoticeHandler, WorkflowNotice};
use crate::session::{Phase, SessionSummary};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    Yaml,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the outcome of a `run`
    pub fn format_summary(&self, summary: &SessionSummary) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary)
                .context("Failed to serialize session summary to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(summary).context("Failed to serialize session summary to YAML")
            }
            OutputFormat::Human => Ok(format_summary_human(summary)),
        }
    }

    pub fn format_status(&self, status: &SessionStatus) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(status)
                .context("Failed to serialize session status to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(status).context("Failed to serialize session status to YAML")
            }
            OutputFormat::Human => Ok(format_status_human(status)),
        }
    }

    pub fn format_questions(&self, questions: &[Question]) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(questions)
                .context("Failed to serialize questions to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(questions).context("Failed to serialize questions to YAML")
            }
            OutputFormat::Human => {
                let mut output = String::new();
                for (index, question) in questions.iter().enumerate() {
                    output.push_str(&format_question(index, questions.len(), question));
                    output.push('\n');
                }
                Ok(output)
            }
        }
    }

    pub fn format_config(&self, config: &ClientConfig) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(config).context("Failed to serialize config to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(config).context("Failed to serialize config to YAML")
            }
            OutputFormat::Human => Ok(config.to_string()),
        }
    }
}

fn format_summary_human(summary: &SessionSummary) -> String {
    let mut output = String::new();

    if summary.phase == Phase::Complete {
        output.push_str("\u{2713} Handover Document\n");
    } else {
        output.push_str(&format!("\u{26A0} Session ended in phase: {}\n", summary.phase));
    }
    output.push_str(RULE);
    output.push_str("\n\n");

    output.push_str(&format!("Session:  {}\n", summary.session_id));
    if let Some(ref metadata) = summary.metadata {
        output.push_str(&format!("File:     {}\n", metadata.file_name));
        if !metadata.business_title.is_empty() {
            output.push_str(&format!("Title:    {}\n", metadata.business_title));
        }
        if !metadata.author_name.is_empty() {
            output.push_str(&format!("Author:   {}\n", metadata.author_name));
        }
    }
    output.push('\n');

    if let Some(ref scoping) = summary.scoping {
        output.push_str(&format_scoping(scoping));
        output.push('\n');
    }

    if !summary.answers.is_empty() {
        output.push_str("Answers:\n");
        let last = summary.answers.len() - 1;
        for (i, answer) in summary.answers.iter().enumerate() {
            let connector = if i == last { "\u{2514}" } else { "\u{251C}" };
            let text = if answer.text.is_empty() {
                "(skipped)"
            } else {
                answer.text.as_str()
            };
            output.push_str(&format!(
                "{}\u{2500} {}: {}\n",
                connector, answer.question_id, text
            ));
        }
        output.push('\n');
    }

    match summary.generated_document {
        Some(ref document) => {
            output.push_str(RULE);
            output.push_str("\n\n");
            output.push_str(document);
            if !document.ends_with('\n') {
                output.push('\n');
            }
        }
        None => output.push_str("No document was generated.\n"),
    }

    output
}

fn format_status_human(status: &SessionStatus) -> String {
    let mut output = String::new();
    output.push_str(&format!("Phase:    {}\n", status.phase));
    if let Some(ref filename) = status.filename {
        output.push_str(&format!("File:     {}\n", filename));
    }
    if let Some(ref scoping) = status.scoping_result {
        output.push('\n');
        output.push_str(&format_scoping(&ScopingInsight::extract(scoping)));
    }
    if let Some(ref policy) = status.user_policy {
        output.push_str("\nPolicy:\n");
        output.push_str(policy);
        output.push('\n');
    }
    output
}

fn format_scoping(scoping: &ScopingInsight) -> String {
    let mut output = String::from("Scoping:\n");
    let field = |value: Extracted<&String>| match value {
        Extracted::Resolved(text) => text.clone(),
        Extracted::Pending => "(pending)".to_string(),
    };
    output.push_str(&format!(
        "\u{251C}\u{2500} Task:      {}\n",
        field(scoping.task_summary.as_ref())
    ));
    output.push_str(&format!(
        "\u{251C}\u{2500} Audience:  {}\n",
        field(scoping.audience.as_ref())
    ));
    match scoping.policy_suggestions.as_ref() {
        Extracted::Resolved(items) => {
            output.push_str("\u{2514}\u{2500} Suggested focus:\n");
            for item in items {
                output.push_str(&format!("     - {}\n", item));
            }
        }
        Extracted::Pending => output.push_str("\u{2514}\u{2500} Suggested focus: (pending)\n"),
    }
    output
}

fn format_question(index: usize, total: usize, question: &Question) -> String {
    let mut output = format!("[{}/{}] {}\n", index + 1, total, question.prompt);
    match &question.kind {
        QuestionKind::FreeText { placeholder } if !placeholder.is_empty() => {
            output.push_str(&format!("      {}\n", placeholder));
        }
        QuestionKind::FreeText { .. } => {}
        QuestionKind::SingleChoice { options } => {
            for (i, option) in options.iter().enumerate() {
                output.push_str(&format!("  {}) {}\n", i + 1, option));
            }
        }
    }
    if question.skippable {
        output.push_str("  (Enter to skip)\n");
    }
    output
}

/// Shows workflow notices on stderr, with a progress bar while processing
pub struct TerminalHandler {
    quiet: bool,
    interactive: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalHandler {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            interactive: atty::is(atty::Stream::Stderr),
            bar: Mutex::new(None),
        }
    }

    fn say(&self, line: &str) {
        if !self.quiet {
            self.suspend(|| eprintln!("{}", line));
        }
    }

    fn suspend(&self, print: impl FnOnce()) {
        match self.bar.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(bar) => bar.suspend(print),
                None => print(),
            },
            Err(_) => print(),
        }
    }

    fn update_bar(&self, step: &str, percent: u8) {
        if self.quiet {
            return;
        }
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };
        let bar = guard.get_or_insert_with(|| {
            let bar = if self.interactive {
                ProgressBar::new(100)
            } else {
                ProgressBar::hidden()
            };
            let style = ProgressStyle::with_template("{msg:20} [{bar:30}] {pos:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
            bar.set_style(style);
            bar
        });
        bar.set_message(step.to_string());
        bar.set_position(u64::from(percent));
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl NoticeHandler for TerminalHandler {
    fn on_notice(&self, notice: &WorkflowNotice) {
        match notice {
            WorkflowNotice::PhaseChanged { from, to } => {
                if matches!(from, Phase::Uploading | Phase::Processing)
                    && !matches!(to, Phase::Uploading | Phase::Processing)
                {
                    self.finish_bar();
                }
                self.say(&format!("\u{2192} {}", to));
            }
            WorkflowNotice::UploadStarted { file_name } => {
                self.say(&format!("Uploading {}...", file_name));
            }
            WorkflowNotice::Progress { step, percent } => self.update_bar(step, *percent),
            WorkflowNotice::ScopingUpdated(insight) => {
                if !insight.is_empty() {
                    self.say(&format_scoping(insight));
                }
            }
            WorkflowNotice::QuestionAsked {
                index,
                total,
                question,
            } => {
                // Questions are shown even in quiet mode; the run cannot go on without them
                self.suspend(|| eprint!("\n{}> ", format_question(*index, *total, question)));
            }
            WorkflowNotice::AnswerRejected { reason } => {
                self.suspend(|| eprintln!("\u{2717} {}", reason));
            }
            WorkflowNotice::AnalysisStarted => {
                self.say("Analyzing the recording. This can take several minutes...");
            }
            WorkflowNotice::StepFailed { step, message } => {
                self.finish_bar();
                eprintln!("\u{2717} The {} failed: {}", step, message);
            }
            WorkflowNotice::ServerError => {
                self.finish_bar();
                eprintln!("\u{2717} The server reported an error for this session");
            }
            WorkflowNotice::ConnectionFailed { attempts } => {
                self.finish_bar();
                eprintln!(
                    "\u{2717} Lost the live connection to the server after {} attempts",
                    attempts
                );
            }
            WorkflowNotice::Completed { .. } => {
                self.finish_bar();
                self.say("\u{2713} Done");
            }
        }
    }
}
