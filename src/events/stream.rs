//! Resilient event stream client
//!
//! [`EventStreamClient`] keeps at most one push connection per session alive.
//! A background task reads the connection and forwards every application event
//! into a single typed sink. Transport faults are retried according to a
//! [`RetryPolicy`]; after the last allowed retry exactly one
//! [`StreamMessage::ConnectionFailed`] is sent and the task stops.
//!
//! Cancellation is explicit: [`EventStreamClient::close`] signals the task over
//! a watch channel, which interrupts a pending backoff sleep or drops the live
//! connection, and then joins the task.

use super::retry::{RetryDecision, RetryPolicy};
use super::transport::{EventTransport, TransportError};
use super::{Event, StreamMessage};
use crate::session::SessionId;
use futures_util::StreamExt;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// Never opened
    Idle,
    Connecting,
    Live,
    /// Waiting for the backoff delay before reconnecting
    RetryPending,
    /// `done` was received; the stream cannot be reopened
    Finished,
    /// Retries exhausted
    Failed,
    Closed,
}

impl StreamStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            StreamStatus::Connecting | StreamStatus::Live | StreamStatus::RetryPending
        )
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StreamStatus::Idle => "idle",
            StreamStatus::Connecting => "connecting",
            StreamStatus::Live => "live",
            StreamStatus::RetryPending => "retry pending",
            StreamStatus::Finished => "finished",
            StreamStatus::Failed => "failed",
            StreamStatus::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Read-only snapshot of the reconnection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryState {
    pub attempt: u32,
    pub retry_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("Event stream is already open for this session")]
    AlreadyOpen,

    #[error("Event stream already received done; it cannot be reopened")]
    Finished,
}

#[derive(Debug)]
struct SharedState {
    status: StreamStatus,
    attempt: u32,
}

fn lock(state: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct EventStreamClient<T> {
    transport: Arc<T>,
    policy: RetryPolicy,
    state: Arc<Mutex<SharedState>>,
    worker: Option<Worker>,
}

impl<T> EventStreamClient<T>
where
    T: EventTransport + 'static,
{
    pub fn new(transport: Arc<T>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            state: Arc::new(Mutex::new(SharedState {
                status: StreamStatus::Idle,
                attempt: 0,
            })),
            worker: None,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Starts streaming events for `session_id` into `sink`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<M>(
        &mut self,
        session_id: &SessionId,
        sink: mpsc::UnboundedSender<M>,
    ) -> Result<(), StreamError>
    where
        M: From<StreamMessage> + Send + 'static,
    {
        {
            let mut state = lock(&self.state);
            match state.status {
                status if status.is_active() => return Err(StreamError::AlreadyOpen),
                StreamStatus::Finished => return Err(StreamError::Finished),
                _ => {}
            }
            state.status = StreamStatus::Connecting;
            state.attempt = 0;
        }

        // A previous worker that failed on its own has already returned
        self.worker.take();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(supervise(
            Arc::clone(&self.transport),
            self.policy,
            Arc::clone(&self.state),
            session_id.clone(),
            sink,
            shutdown_rx,
        ));
        self.worker = Some(Worker { shutdown, handle });

        info!(session_id = %session_id, "Event stream opened");
        Ok(())
    }

    /// Cancels a pending retry or drops the live connection, then waits for the
    /// background task. Calling it again is a no-op.
    pub async fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let _ = worker.shutdown.send(true);
        if let Err(e) = worker.handle.await {
            if e.is_panic() {
                error!("Event stream task panicked: {}", e);
            }
        }

        let mut state = lock(&self.state);
        if state.status.is_active() {
            state.status = StreamStatus::Closed;
        }
        debug!(status = %state.status, "Event stream closed");
    }

    pub fn status(&self) -> StreamStatus {
        lock(&self.state).status
    }

    pub fn retry_state(&self) -> RetryState {
        let state = lock(&self.state);
        RetryState {
            attempt: state.attempt,
            retry_pending: state.status == StreamStatus::RetryPending,
        }
    }
}

impl<T> Drop for EventStreamClient<T> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(true);
        }
    }
}

impl<T> fmt::Debug for EventStreamClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("EventStreamClient")
            .field("status", &state.status)
            .field("attempt", &state.attempt)
            .field("policy", &self.policy)
            .finish()
    }
}

enum ConnectionOutcome {
    Done,
    SinkClosed,
    Failed(TransportError),
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn supervise<T, M>(
    transport: Arc<T>,
    policy: RetryPolicy,
    state: Arc<Mutex<SharedState>>,
    session_id: SessionId,
    sink: mpsc::UnboundedSender<M>,
    mut shutdown: watch::Receiver<bool>,
) where
    T: EventTransport + 'static,
    M: From<StreamMessage> + Send + 'static,
{
    loop {
        lock(&state).status = StreamStatus::Connecting;

        let outcome = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => return,
            outcome = run_connection(transport.as_ref(), &session_id, &state, &sink) => outcome,
        };

        let failure = match outcome {
            ConnectionOutcome::Done => {
                info!(session_id = %session_id, "Event stream finished");
                return;
            }
            ConnectionOutcome::SinkClosed => {
                debug!("Event sink dropped, stopping stream");
                lock(&state).status = StreamStatus::Closed;
                return;
            }
            ConnectionOutcome::Failed(failure) => failure,
        };

        let attempt = lock(&state).attempt;
        match policy.decide(attempt) {
            RetryDecision::RetryAfter(delay) => {
                warn!(
                    session_id = %session_id,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "Event stream dropped, reconnecting"
                );
                lock(&state).status = StreamStatus::RetryPending;

                tokio::select! {
                    biased;
                    _ = wait_for_shutdown(&mut shutdown) => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                lock(&state).attempt += 1;
            }
            RetryDecision::GiveUp => {
                let attempts = attempt + 1;
                error!(
                    session_id = %session_id,
                    attempts,
                    error = %failure,
                    "Event stream failed, giving up"
                );
                lock(&state).status = StreamStatus::Failed;
                let _ = sink.send(M::from(StreamMessage::ConnectionFailed { attempts }));
                return;
            }
        }
    }
}

async fn run_connection<T, M>(
    transport: &T,
    session_id: &SessionId,
    state: &Mutex<SharedState>,
    sink: &mpsc::UnboundedSender<M>,
) -> ConnectionOutcome
where
    T: EventTransport,
    M: From<StreamMessage>,
{
    let mut connection = match transport.connect(session_id).await {
        Ok(connection) => connection,
        Err(e) => return ConnectionOutcome::Failed(e),
    };
    lock(state).status = StreamStatus::Live;
    debug!(session_id = %session_id, "Event stream connected");

    while let Some(item) = connection.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => return ConnectionOutcome::Failed(e),
        };

        let done = event == Event::Done;
        {
            let mut state = lock(state);
            state.attempt = 0;
            if done {
                state.status = StreamStatus::Finished;
            }
        }

        if sink.send(M::from(StreamMessage::Event(event))).is_err() {
            return ConnectionOutcome::SinkClosed;
        }
        if done {
            return ConnectionOutcome::Done;
        }
    }

    ConnectionOutcome::Failed(TransportError::Ended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::mock::{MockConnection, MockTransport};
    use std::time::Duration;

    fn session() -> SessionId {
        SessionId::new("stream-test").unwrap()
    }

    fn phase(name: &str) -> Event {
        Event::Phase {
            phase: name.to_string(),
        }
    }

    fn deltas(times: &[tokio::time::Instant]) -> Vec<u64> {
        times
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_then_single_connection_failed() {
        let transport = Arc::new(MockTransport::new());
        let mut client = EventStreamClient::new(transport.clone(), RetryPolicy::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamMessage>();

        client.open(&session(), tx).unwrap();

        assert_eq!(
            rx.recv().await,
            Some(StreamMessage::ConnectionFailed { attempts: 6 })
        );
        // Sender was dropped with the task; nothing else arrives
        assert_eq!(rx.recv().await, None);

        assert_eq!(transport.connect_count(), 6);
        assert_eq!(
            deltas(&transport.connect_times()),
            vec![1000, 2000, 4000, 8000, 16000]
        );
        assert_eq!(client.status(), StreamStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_resets_attempt_counter() {
        let transport = Arc::new(MockTransport::with_script([
            MockConnection::Refuse,
            MockConnection::Refuse,
            MockConnection::events([phase("processing")]),
        ]));
        let mut client = EventStreamClient::new(transport.clone(), RetryPolicy::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamMessage>();
        client.open(&session(), tx).unwrap();

        assert_eq!(rx.recv().await, Some(StreamMessage::Event(phase("processing"))));
        assert_eq!(
            rx.recv().await,
            Some(StreamMessage::ConnectionFailed { attempts: 6 })
        );

        // refuse, refuse, events (then ended), followed by a fresh backoff sequence
        assert_eq!(
            deltas(&transport.connect_times()),
            vec![1000, 2000, 1000, 2000, 4000, 8000, 16000]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_finishes_without_reconnect() {
        let transport = Arc::new(MockTransport::with_script([MockConnection::events([
            phase("complete"),
            Event::Done,
        ])]));
        let mut client = EventStreamClient::new(transport.clone(), RetryPolicy::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamMessage>();
        client.open(&session(), tx.clone()).unwrap();

        assert_eq!(rx.recv().await, Some(StreamMessage::Event(phase("complete"))));
        assert_eq!(rx.recv().await, Some(StreamMessage::Event(Event::Done)));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(client.status(), StreamStatus::Finished);
        assert_eq!(client.open(&session(), tx), Err(StreamError::Finished));

        client.close().await;
        client.close().await;
        assert_eq!(client.status(), StreamStatus::Finished);
    }

    #[tokio::test]
    async fn test_open_twice_is_rejected() {
        let transport = Arc::new(MockTransport::with_script([
            MockConnection::events_then_hold(Vec::new()),
        ]));
        let mut client = EventStreamClient::new(transport, RetryPolicy::default());
        let (tx, _rx) = mpsc::unbounded_channel::<StreamMessage>();

        client.open(&session(), tx.clone()).unwrap();
        assert_eq!(client.open(&session(), tx), Err(StreamError::AlreadyOpen));
        client.close().await;
        assert_eq!(client.status(), StreamStatus::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_retry() {
        let transport = Arc::new(MockTransport::new());
        let mut client = EventStreamClient::new(transport.clone(), RetryPolicy::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamMessage>();
        client.open(&session(), tx).unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(client.status(), StreamStatus::RetryPending);
        assert_eq!(
            client.retry_state(),
            RetryState {
                attempt: 0,
                retry_pending: true
            }
        );

        client.close().await;
        assert_eq!(client.status(), StreamStatus::Closed);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_event_is_retried() {
        let transport = Arc::new(MockTransport::with_script([
            MockConnection::Stream {
                items: vec![Err(TransportError::Server("session lost".to_string()))],
                hold_open: true,
            },
            MockConnection::events([phase("questioning"), Event::Done]),
        ]));
        let mut client = EventStreamClient::new(transport.clone(), RetryPolicy::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamMessage>();
        client.open(&session(), tx).unwrap();

        assert_eq!(rx.recv().await, Some(StreamMessage::Event(phase("questioning"))));
        assert_eq!(rx.recv().await, Some(StreamMessage::Event(Event::Done)));
        assert_eq!(deltas(&transport.connect_times()), vec![1000]);
    }

    #[tokio::test]
    async fn test_reopen_after_close() {
        let transport = Arc::new(MockTransport::with_script([
            MockConnection::events_then_hold(Vec::new()),
            MockConnection::events([Event::Done]),
        ]));
        let mut client = EventStreamClient::new(transport, RetryPolicy::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamMessage>();

        client.open(&session(), tx.clone()).unwrap();
        while client.status() != StreamStatus::Live {
            tokio::task::yield_now().await;
        }
        client.close().await;
        client.open(&session(), tx).unwrap();
        assert_eq!(rx.recv().await, Some(StreamMessage::Event(Event::Done)));
    }
}
