//! hikitsugi - client for the handover assistant
//!
//! A recording of a business task is uploaded to the handover server, which
//! transcribes and scopes it, asks a few questions and finally writes a
//! handover document. This crate drives that workflow from the client side.
//!
//! # Core Concepts
//!
//! - **Phase machine**: a pure transition function over [`Phase`] that decides
//!   what happens next for every server push and every local result
//! - **Event stream**: a resilient server-sent events connection that
//!   reconnects with exponential backoff
//! - **Controllers**: the request/response steps (upload, questioning,
//!   analysis and document generation)
//! - **Workflow**: owns the session and connects everything through a single
//!   input queue
//!
//! # Example Usage
//!
//! ```no_run
//! use hikitsugi::{ClientConfig, HttpBackend, HttpEventTransport, SessionId, UploadRequest, Workflow};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let backend = Arc::new(HttpBackend::from_config(&config)?);
//! let transport = Arc::new(HttpEventTransport::new(&config.server_url, config.request_timeout())?);
//!
//! let mut workflow = Workflow::new(backend, transport, SessionId::generate(), config.retry_policy());
//! workflow.run(UploadRequest::new("meeting.mp4")).await?;
//! println!("{}", workflow.context().generated_document().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod controllers;
pub mod events;
pub mod machine;
pub mod notice;
pub mod session;
pub mod util;
pub mod workflow;

pub use api::{ApiError, BackendApi, HttpBackend, MockBackend};
pub use config::{ClientConfig, ConfigError};
pub use controllers::{Question, ScopingInsight, UploadRequest};
pub use events::{
    Event, EventStreamClient, EventTransport, HttpEventTransport, MockTransport, RetryPolicy,
    StreamMessage,
};
pub use machine::{Effect, Signal};
pub use notice::{LoggingHandler, NoticeHandler, WorkflowNotice};
pub use session::{Phase, SessionContext, SessionId};
pub use util::{init_from_env, init_logging, LoggingConfig};
pub use workflow::{UserAction, Workflow, WorkflowError, WorkflowInput};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
