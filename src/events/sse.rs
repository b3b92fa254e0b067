//! `text/event-stream` decoding
//!
//! The wire format is line based:
//!
//! ```text
//! event: phase
//! data: {"phase": "processing"}
//!
//! event: progress
//! data: {"step": "Extracting frames", "progress": 40}
//!
//! ```
//!
//! A blank line dispatches the frame. Bytes are buffered until a full line is
//! available so multi-byte characters split across chunks decode correctly.

use super::transport::TransportError;
use super::Event;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use tracing::{debug, warn};

/// One dispatched frame before interpretation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Event name, `message` when the frame has no `event:` field
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Longest line the decoder buffers while waiting for its newline
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Incremental line decoder
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to contain no newline
    scanned: usize,
    max_line: usize,
    event: Option<String>,
    data: Vec<String>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line,
            event: None,
            data: Vec::new(),
        }
    }

    /// Feeds a chunk and returns every frame completed by it.
    ///
    /// Fails when an unterminated line grows past the configured limit; the
    /// buffered bytes are dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, TransportError> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..]
            .iter()
            .position(|b| *b == b'\n')
        {
            let end = self.scanned + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
            start = end + 1;
            self.scanned = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line {
            let buffered = self.buffer.len();
            self.buffer.clear();
            self.scanned = 0;
            return Err(TransportError::Read(format!(
                "event stream line exceeds {} bytes ({} buffered)",
                self.max_line, buffered
            )));
        }
        Ok(frames)
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // Reconnection is driven by the retry policy, not by the server
            "id" | "retry" => {}
            other => debug!(field = other, "Ignoring unknown SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

#[derive(Deserialize)]
struct PhasePayload {
    phase: String,
}

#[derive(Deserialize)]
struct ProgressPayload {
    #[serde(default)]
    step: String,
    progress: f64,
}

#[derive(Deserialize)]
struct ScopingPayload {
    result: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Interprets a frame.
///
/// Returns `Ok(None)` for frames that are skipped: unknown event names and
/// payloads that fail to decode. A server `error` event becomes a transport
/// error so the stream client treats it like a dropped connection.
pub fn decode_frame(frame: &SseFrame) -> Result<Option<Event>, TransportError> {
    let event = match frame.name() {
        "phase" => serde_json::from_str::<PhasePayload>(&frame.data)
            .map(|p| Event::Phase { phase: p.phase }),
        "progress" => serde_json::from_str::<ProgressPayload>(&frame.data).map(|p| {
            Event::Progress {
                step: p.step,
                percent: clamp_percent(p.progress),
            }
        }),
        "scoping" => serde_json::from_str::<ScopingPayload>(&frame.data)
            .map(|p| Event::Scoping { result: p.result }),
        // The payload carries the final phase, which was already announced
        "done" => return Ok(Some(Event::Done)),
        "error" => {
            let message = serde_json::from_str::<ErrorPayload>(&frame.data)
                .map(|p| p.message)
                .unwrap_or_else(|_| frame.data.clone());
            return Err(TransportError::Server(message));
        }
        other => {
            debug!(event = other, "Skipping unknown event");
            return Ok(None);
        }
    };

    match event {
        Ok(event) => Ok(Some(event)),
        Err(e) => {
            warn!(event = frame.name(), error = %e, "Skipping malformed event payload");
            Ok(None)
        }
    }
}

fn clamp_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

type ByteStream<E> = Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>;

struct DecodeState<E> {
    inner: ByteStream<E>,
    decoder: SseDecoder,
    pending: VecDeque<Result<Event, TransportError>>,
    failed: bool,
}

/// Turns a byte stream into a stream of application events.
///
/// Skipped frames produce no item. The stream ends when the byte stream ends
/// or right after the first error.
pub fn decode_stream<S, E>(bytes: S) -> impl Stream<Item = Result<Event, TransportError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        inner: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        failed: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.failed = true;
                    state.pending.clear();
                }
                return Some((item, state));
            }
            if state.failed {
                return None;
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => match state.decoder.feed(&chunk) {
                    Ok(frames) => {
                        for frame in frames {
                            if let Some(item) = decode_frame(&frame).transpose() {
                                state.pending.push_back(item);
                            }
                        }
                    }
                    Err(e) => state.pending.push_back(Err(e)),
                },
                Some(Err(e)) => {
                    state.pending.push_back(Err(TransportError::Read(e.to_string())));
                }
                None => return None,
            }
        }
    })
}
