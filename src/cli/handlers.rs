//! Subcommand handlers
//!
//! Each handler returns the process exit code: 0 on success, 1 on failure.

use anyhow::{anyhow, Context, Result};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::commands::{
    ConfigArgs, DocumentArgs, QuestionsArgs, RunArgs, ServerArgs, StatusArgs,
};
use super::output::{OutputFormat, OutputFormatter, TerminalHandler};
use crate::api::{ApiError, BackendApi, HttpBackend};
use crate::config::ClientConfig;
use crate::controllers::{QuestioningController, UploadRequest};
use crate::events::HttpEventTransport;
use crate::session::SessionId;
use crate::workflow::{UserAction, Workflow, WorkflowInput};

pub async fn handle_run(args: &RunArgs, quiet: bool) -> i32 {
    exit_code(run(args, quiet).await)
}

pub async fn handle_status(args: &StatusArgs) -> i32 {
    exit_code(status(args).await)
}

pub async fn handle_document(args: &DocumentArgs) -> i32 {
    exit_code(document(args).await)
}

pub async fn handle_questions(args: &QuestionsArgs) -> i32 {
    let questions = QuestioningController::default();
    exit_code(
        OutputFormatter::new(args.format.into())
            .format_questions(questions.questions())
            .map(|output| {
                print!("{}", output);
                0
            }),
    )
}

pub async fn handle_config(args: &ConfigArgs) -> i32 {
    let config = apply_overrides(ClientConfig::default(), &args.server);
    let printed = OutputFormatter::new(args.format.into())
        .format_config(&config)
        .map(|output| print!("{}", output));
    if let Err(e) = printed {
        return exit_code(Err(e));
    }

    match config.validate() {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn exit_code(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<ApiError>() {
                Some(api_error) => eprintln!("{}", api_error.help_message()),
                None => eprintln!("Error: {:#}", e),
            }
            1
        }
    }
}

fn apply_overrides(mut config: ClientConfig, server: &ServerArgs) -> ClientConfig {
    if let Some(ref url) = server.server {
        config.server_url = url.trim_end_matches('/').to_string();
    }
    if let Some(timeout) = server.timeout {
        config.request_timeout_secs = timeout;
    }
    config
}

fn load_config(server: &ServerArgs) -> Result<ClientConfig> {
    let config = apply_overrides(ClientConfig::default(), server);
    config.validate().context("Invalid configuration")?;
    debug!(server = %config.server_url, "Configuration loaded");
    Ok(config)
}

fn write_output(output: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, output)
            .with_context(|| format!("Failed to write output to {}", path.display())),
        None => {
            print!("{}", output);
            Ok(())
        }
    }
}

/// Forwards stdin lines as answers. EOF is reported once, then the thread ends.
fn spawn_stdin_reader(sender: mpsc::UnboundedSender<WorkflowInput>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if sender.send(UserAction::Answer(line).into()).is_err() {
                return;
            }
        }
        let _ = sender.send(UserAction::EndOfInput.into());
    });
}

async fn run(args: &RunArgs, quiet: bool) -> Result<i32> {
    let config = load_config(&args.server)?;

    let session_id = match args.session_id {
        Some(ref id) => SessionId::new(id.clone())?,
        None => SessionId::generate(),
    };

    let backend = Arc::new(HttpBackend::from_config(&config)?);
    let transport = Arc::new(
        HttpEventTransport::new(&config.server_url, config.request_timeout())
            .context("Failed to create the event stream client")?,
    );

    let mut workflow = Workflow::new(backend, transport, session_id, config.retry_policy())
        .with_max_upload_bytes(config.max_upload_bytes)
        .with_notice_handler(Arc::new(TerminalHandler::new(quiet)));
    spawn_stdin_reader(workflow.input_sender());

    let request = UploadRequest::new(&args.file)
        .with_title(&args.title)
        .with_author(&args.author)
        .with_notes(&args.notes);

    let result = workflow.run(request).await;
    workflow.shutdown().await;

    let format: OutputFormat = args.format.into();
    let summary = workflow.context().summary();
    if result.is_ok() || format != OutputFormat::Human {
        let output = OutputFormatter::new(format).format_summary(&summary)?;
        write_output(&output, args.output.as_deref())?;
    }

    match result {
        Ok(()) => Ok(0),
        Err(e) => {
            error!(session_id = %summary.session_id, error = %e, "Run failed");
            eprintln!("Error: {}", e);
            Ok(1)
        }
    }
}

async fn status(args: &StatusArgs) -> Result<i32> {
    let config = load_config(&args.server)?;
    let session_id = SessionId::new(args.session_id.clone())?;
    let backend = HttpBackend::from_config(&config)?;

    let status = backend.fetch_status(&session_id).await?;
    let output = OutputFormatter::new(args.format.into()).format_status(&status)?;
    print!("{}", output);
    Ok(0)
}

async fn document(args: &DocumentArgs) -> Result<i32> {
    let config = load_config(&args.server)?;
    let session_id = SessionId::new(args.session_id.clone())?;
    let backend = HttpBackend::from_config(&config)?;

    let stored = backend.fetch_document(&session_id).await?;
    let document = stored
        .document
        .filter(|document| !document.trim().is_empty())
        .ok_or_else(|| anyhow!("No document has been generated for session {}", session_id))?;

    write_output(&document, args.output.as_deref())?;
    Ok(0)
}
