//! Shared helpers for integration tests

use hikitsugi::notice::{NoticeHandler, WorkflowNotice};
use hikitsugi::workflow::{UserAction, WorkflowInput};
use std::collections::VecDeque;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Answers every question from a fixed list and records all notices
pub struct AutoAnswer {
    answers: Mutex<VecDeque<String>>,
    sender: mpsc::UnboundedSender<WorkflowInput>,
    notices: Mutex<Vec<WorkflowNotice>>,
}

#[allow(dead_code)]
impl AutoAnswer {
    pub fn new(sender: mpsc::UnboundedSender<WorkflowInput>, answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            sender,
            notices: Mutex::new(Vec::new()),
        }
    }

    pub fn notices(&self) -> Vec<WorkflowNotice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&WorkflowNotice) -> bool) -> usize {
        self.notices().iter().filter(|n| predicate(n)).count()
    }
}

impl NoticeHandler for AutoAnswer {
    fn on_notice(&self, notice: &WorkflowNotice) {
        self.notices.lock().unwrap().push(notice.clone());
        if let WorkflowNotice::QuestionAsked { .. } = notice {
            let next = self.answers.lock().unwrap().pop_front();
            let action = match next {
                Some(answer) => UserAction::Answer(answer),
                None => UserAction::EndOfInput,
            };
            let _ = self.sender.send(action.into());
        }
    }
}

/// A small file standing in for a screen recording
pub fn recording() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("recording")
        .suffix(".mp4")
        .tempfile()
        .unwrap();
    file.write_all(b"\x00\x00\x00\x18ftypmp42 fake recording")
        .unwrap();
    file
}

#[allow(dead_code)]
pub fn hikitsugi_bin() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.join("hikitsugi")
}
