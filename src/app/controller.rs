//! Request ownership and stream driving.
//!
//! Every user action that talks to the agent takes exclusive ownership of the
//! network channel through [`RequestController::supersede`], which cancels
//! the previous request first. The returned [`RequestTicket`] carries the
//! stream id the state machine will accept events from and the token the
//! driver watches for cancellation.
//!
//! [`drive`] runs one request to completion: it waits for headers, turns a
//! non-success status into an error transition, and otherwise feeds the
//! decoded body into the store one event at a time, in arrival order.

use futures::StreamExt;
use std::fmt;
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::state::StreamId;
use super::store::StateStore;
use crate::api::{decode_stream, error_detail};
use crate::error::{ChatError, ChatResult};
use crate::session::StaleMarker;
use crate::types::StreamEvent;

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The agent finished its reply.
    Completed,
    /// The agent paused for a human decision.
    AwaitingApproval,
    /// The request or stream failed; the conversation is in `error`.
    Failed,
    /// The request was cancelled or superseded.
    Cancelled,
}

impl fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Completed => "completed",
            Self::AwaitingApproval => "awaiting approval",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Ownership of the network channel for one request.
#[derive(Debug, Clone)]
pub struct RequestTicket {
    pub stream: StreamId,
    pub token: CancellationToken,
}

#[derive(Debug)]
struct ActiveRequest {
    stream: StreamId,
    token: CancellationToken,
}

/// Tracks the single in-flight request.
///
/// Dropping the controller cancels whatever is still running.
#[derive(Debug, Default)]
pub struct RequestController {
    active: Option<ActiveRequest>,
    next_stream: u64,
}

impl RequestController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the current request, if any, and issues a ticket for a new one.
    pub fn supersede(&mut self) -> RequestTicket {
        if let Some(previous) = self.active.take() {
            debug!(stream = %previous.stream, "Superseding in-flight request");
            previous.token.cancel();
        }

        self.next_stream += 1;
        let ticket = RequestTicket {
            stream: StreamId(self.next_stream),
            token: CancellationToken::new(),
        };
        self.active = Some(ActiveRequest {
            stream: ticket.stream,
            token: ticket.token.clone(),
        });
        ticket
    }

    /// Cancels the current request. Returns its stream id if one was running.
    pub fn cancel(&mut self) -> Option<StreamId> {
        let active = self.active.take()?;
        debug!(stream = %active.stream, "Cancelling in-flight request");
        active.token.cancel();
        Some(active.stream)
    }

    /// Cancels everything; the controller stays usable afterwards.
    pub fn dispose(&mut self) {
        self.cancel();
    }

    /// The stream id of the request currently owning the channel.
    #[must_use]
    pub fn active_stream(&self) -> Option<StreamId> {
        self.active.as_ref().map(|active| active.stream)
    }
}

impl Drop for RequestController {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Awaitable handle to a spawned request.
#[derive(Debug)]
pub struct StreamHandle {
    stream: StreamId,
    task: JoinHandle<StreamOutcome>,
}

impl StreamHandle {
    pub(crate) fn new(stream: StreamId, task: JoinHandle<StreamOutcome>) -> Self {
        Self { stream, task }
    }

    #[must_use]
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Waits for the request to end.
    pub async fn wait(self) -> StreamOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => StreamOutcome::Cancelled,
            Err(e) => {
                error!(stream = %self.stream, error = %e, "Stream task panicked");
                StreamOutcome::Failed
            }
        }
    }
}

/// Context a request needs to report that its session is gone.
#[derive(Debug, Clone)]
pub(crate) struct SessionContext {
    pub(crate) session_id: String,
    pub(crate) stale: StaleMarker,
}

/// Runs one request and applies its stream to `store`.
///
/// The outcome is decided by what this request itself applied: a stream
/// whose `done` landed is `Completed` even if a newer request has taken over
/// by the time the body ends.
pub(crate) async fn drive<F>(
    store: StateStore,
    ticket: RequestTicket,
    session: SessionContext,
    request: F,
) -> StreamOutcome
where
    F: Future<Output = ChatResult<reqwest::Response>>,
{
    let RequestTicket { stream, token } = ticket;

    let response = tokio::select! {
        biased;
        _ = token.cancelled() => return cancelled(&store, stream, None),
        response = request => response,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!(stream = %stream, error = %e, "Request failed");
            return fail(&store, stream, e.user_message());
        }
    };

    let status = response.status();
    if !status.is_success() {
        let detail = tokio::select! {
            biased;
            _ = token.cancelled() => return cancelled(&store, stream, None),
            detail = error_detail(response) => detail,
        };
        let err = ChatError::remote(Some(status.as_u16()), detail);
        warn!(stream = %stream, status = status.as_u16(), error = %err, "Agent returned an error status");
        if err.is_session_gone() {
            session.stale.mark(&session.session_id).await;
        }
        return fail(&store, stream, err.user_message());
    }

    debug!(stream = %stream, "Streaming response");
    let events = decode_stream(response.bytes_stream());
    futures::pin_mut!(events);

    let mut terminal = None;
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return cancelled(&store, stream, terminal),
            next = events.next() => next,
        };
        let Some(event) = next else { break };
        let ends = terminal_outcome(&event);
        if store.apply(stream, event) && ends.is_some() {
            terminal = ends;
        }
    }

    let was_active = store.finish(stream);
    match terminal {
        Some(outcome) => outcome,
        // Still active with no terminal event: the body ended early.
        None if was_active => StreamOutcome::Failed,
        None => StreamOutcome::Cancelled,
    }
}

/// Outcome a stream reaches once `event` has been applied.
fn terminal_outcome(event: &StreamEvent) -> Option<StreamOutcome> {
    match event {
        StreamEvent::Done => Some(StreamOutcome::Completed),
        StreamEvent::ApprovalRequired { .. } => Some(StreamOutcome::AwaitingApproval),
        StreamEvent::Error { .. } => Some(StreamOutcome::Failed),
        _ => None,
    }
}

fn fail(store: &StateStore, stream: StreamId, message: String) -> StreamOutcome {
    let applied = store.apply(stream, StreamEvent::Error { message });
    store.finish(stream);
    if applied {
        StreamOutcome::Failed
    } else {
        StreamOutcome::Cancelled
    }
}

fn cancelled(store: &StateStore, stream: StreamId, terminal: Option<StreamOutcome>) -> StreamOutcome {
    debug!(stream = %stream, "Request cancelled");
    store.cancel(stream);
    terminal.unwrap_or(StreamOutcome::Cancelled)
}
