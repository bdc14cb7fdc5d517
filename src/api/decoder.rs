//! Incremental decoder for the agent's event stream.
//!
//! Response bodies arrive in arbitrary chunks. [`FrameDecoder`] buffers bytes,
//! splits on `\n`, and pairs each `data:` line with the `event:` line that
//! preceded it. A trailing partial line stays in the buffer until the next
//! chunk completes it, so a frame split at any byte offset (including inside
//! a multi-byte UTF-8 sequence) decodes exactly like an unsplit one.
//!
//! [`decode_stream`] wraps a byte stream into a lazy stream of
//! [`StreamEvent`]s. Decoding stops at the first protocol or transport error,
//! which is surfaced as a final [`StreamEvent::Error`].

use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::types::StreamEvent;

/// Splits buffered bytes into frames and decodes them.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Length of the buffered prefix already searched for a newline.
    scanned: usize,
    current_event: Option<String>,
    failed: bool,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every event it completed.
    ///
    /// After a protocol error the decoder is poisoned: the error event is
    /// returned once and every later call yields nothing.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.failed {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;

        while let Some(offset) = self.buffer[search_from..].iter().position(|&b| b == b'\n') {
            let end = search_from + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            search_from = start;

            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
            if self.failed {
                break;
            }
        }

        if self.failed {
            self.buffer.clear();
        } else if start > 0 {
            self.buffer.drain(..start);
        }
        self.scanned = self.buffer.len();

        events
    }

    /// Flushes whatever is left once the body has ended.
    ///
    /// A final line without a terminating newline is decoded here; at end of
    /// stream it can no longer be incomplete.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        self.scanned = 0;
        if self.failed || self.buffer.is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        let line = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
        self.process_line(&line).into_iter().collect()
    }

    /// Returns true once a protocol error has stopped decoding.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Number of bytes held back waiting for a newline.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn process_line(&mut self, line: &str) -> Option<StreamEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            // Frame boundary.
            self.current_event = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }

        if let Some(name) = field_value(line, "event") {
            self.current_event = Some(name.trim().to_string());
            return None;
        }

        let data = field_value(line, "data")?;
        let Some(name) = self.current_event.take() else {
            debug!(line = %line, "Dropping data line without a preceding event line");
            return None;
        };

        match StreamEvent::from_frame(&name, data) {
            Ok(Some(event)) => Some(event),
            Ok(None) => {
                debug!(event = %name, "Ignoring unknown stream event");
                None
            }
            Err(err) => {
                warn!(event = %name, error = %err, "Stream decoding stopped on malformed frame");
                self.failed = true;
                Some(StreamEvent::Error {
                    message: err.to_string(),
                })
            }
        }
    }
}

/// Returns the value of an SSE field line, tolerating a missing space.
fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: FrameDecoder,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

/// Decodes a chunked response body into a lazy, ordered event stream.
///
/// The returned stream ends when the body ends, or right after the first
/// [`StreamEvent::Error`] produced by a malformed frame or a failed read.
/// It is consumed once; there is no way to restart it.
pub fn decode_stream<S, B, E>(body: S) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    state.pending.extend(state.decoder.push(chunk.as_ref()));
                    state.finished = state.decoder.is_failed();
                }
                Some(Err(err)) => {
                    warn!(error = %err, "Stream read failed");
                    state.pending.push_back(StreamEvent::Error {
                        message: format!("connection dropped: {err}"),
                    });
                    state.finished = true;
                }
                None => {
                    state.pending.extend(state.decoder.finish());
                    state.finished = true;
                }
            }
        }
    })
}
