use super::transport::{EventConnection, EventTransport, TransportError};
use super::Event;
use crate::session::SessionId;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub type MockEventSender = mpsc::UnboundedSender<Result<Event, TransportError>>;

/// Scripted outcome of one `connect` call
#[derive(Debug)]
pub enum MockConnection {
    /// `connect` fails
    Refuse,
    /// Yields the items, then ends or stays open without data
    Stream {
        items: Vec<Result<Event, TransportError>>,
        hold_open: bool,
    },
    /// Yields whatever the test pushes through the paired sender
    Channel(mpsc::UnboundedReceiver<Result<Event, TransportError>>),
}

impl MockConnection {
    pub fn events(events: impl IntoIterator<Item = Event>) -> Self {
        MockConnection::Stream {
            items: events.into_iter().map(Ok).collect(),
            hold_open: false,
        }
    }

    pub fn events_then_hold(events: impl IntoIterator<Item = Event>) -> Self {
        MockConnection::Stream {
            items: events.into_iter().map(Ok).collect(),
            hold_open: true,
        }
    }

    pub fn channel() -> (MockEventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, MockConnection::Channel(rx))
    }
}

/// In-memory [`EventTransport`] replaying scripted connections.
///
/// Once the script runs out every further connect is refused.
pub struct MockTransport {
    script: Mutex<VecDeque<MockConnection>>,
    connects: Mutex<Vec<Instant>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            connects: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(script: impl IntoIterator<Item = MockConnection>) -> Self {
        let transport = Self::new();
        transport.add_connections(script);
        transport
    }

    pub fn add_connection(&self, connection: MockConnection) {
        self.script.lock().unwrap().push_back(connection);
    }

    pub fn add_connections(&self, connections: impl IntoIterator<Item = MockConnection>) {
        let mut script = self.script.lock().unwrap();
        script.extend(connections);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().unwrap().len()
    }

    /// Times of every connect call, on the tokio clock
    pub fn connect_times(&self) -> Vec<Instant> {
        self.connects.lock().unwrap().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("remaining_connections", &self.script.lock().unwrap().len())
            .field("connects", &self.connect_count())
            .finish()
    }
}

#[async_trait]
impl EventTransport for MockTransport {
    async fn connect(&self, _session_id: &SessionId) -> Result<EventConnection, TransportError> {
        self.connects.lock().unwrap().push(Instant::now());

        let next = self.script.lock().unwrap().pop_front();
        match next {
            None | Some(MockConnection::Refuse) => {
                Err(TransportError::Connect("connection refused".to_string()))
            }
            Some(MockConnection::Stream { items, hold_open }) => {
                let items = stream::iter(items);
                if hold_open {
                    Ok(items.chain(stream::pending()).boxed())
                } else {
                    Ok(items.boxed())
                }
            }
            Some(MockConnection::Channel(rx)) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
        }
    }
}
