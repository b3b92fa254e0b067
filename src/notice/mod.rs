//! User-visible notices emitted by the workflow

mod handler;
mod logging;

pub use handler::{NoOpHandler, NoticeHandler, WorkflowNotice};
pub use logging::LoggingHandler;
