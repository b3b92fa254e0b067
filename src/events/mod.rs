//! Server-push event channel
//!
//! The server announces progress of a session over a `text/event-stream`
//! connection. This module decodes that stream ([`sse`]), abstracts the
//! connection ([`transport`]) and keeps it alive across transport faults
//! ([`stream`], [`retry`]).

pub mod mock;
pub mod retry;
pub mod sse;
pub mod stream;
pub mod transport;

pub use mock::{MockConnection, MockTransport};
pub use retry::{RetryDecision, RetryPolicy};
pub use stream::{EventStreamClient, RetryState, StreamError, StreamStatus};
pub use transport::{EventConnection, EventTransport, HttpEventTransport, TransportError};

/// Application event received from the push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The server moved the session to another phase
    Phase { phase: String },
    /// Processing progress, percent in 0..=100
    Progress { step: String, percent: u8 },
    /// Free-form scoping text about the uploaded recording
    Scoping { result: String },
    /// The server will send nothing more for this session
    Done,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Phase { .. } => "phase",
            Event::Progress { .. } => "progress",
            Event::Scoping { .. } => "scoping",
            Event::Done => "done",
        }
    }
}

/// What the stream client writes into its sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    Event(Event),
    /// Reconnection gave up after `attempts` consecutive failed connections
    ConnectionFailed { attempts: u32 },
}

impl From<Event> for StreamMessage {
    fn from(event: Event) -> Self {
        StreamMessage::Event(event)
    }
}
