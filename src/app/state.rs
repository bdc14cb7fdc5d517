//! Conversation state machine.
//!
//! [`ConversationState`] is the ordered message log plus one overall
//! [`ConversationStatus`]. Decoded [`StreamEvent`]s are applied to the *open*
//! assistant message, the single message currently receiving content.
//!
//! ```text
//! idle ──begin_turn──▶ streaming ──done──────────────▶ idle
//!                          │      ──error─────────────▶ error
//!                          │      ──approval_required─▶ awaiting_approval
//!                          └──cancel──────────────────▶ idle
//! awaiting_approval ──begin_approval──▶ streaming
//! ```
//!
//! Every stream is tagged with a [`StreamId`]. Events from any stream other
//! than the active one are discarded, which keeps a single logical writer
//! even when a superseded request is still draining.

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use crate::api::History;
use crate::types::{Message, MessageId, Receipt, Role, StreamEvent, ToolCall};

/// Overall status of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Idle,
    Streaming,
    AwaitingApproval,
    Error,
}

impl ConversationStatus {
    /// Returns `true` for the resting states (`idle`, `error`).
    #[must_use]
    pub fn is_resting(self) -> bool {
        matches!(self, Self::Idle | Self::Error)
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Streaming => "streaming",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Identifies one request/response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Message shown in place of an empty message when the body ends early.
pub const CONNECTION_CLOSED: &str = "connection closed before the response completed";

/// The conversation log and its status.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    status: ConversationStatus,
    active_stream: Option<StreamId>,
    /// Index of the open assistant message.
    open: Option<usize>,
    /// Text of the most recent error transition.
    last_error: Option<String>,
    next_id: u64,
}

impl ConversationState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages, in insertion order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    /// The stream whose events are currently accepted.
    #[must_use]
    pub fn active_stream(&self) -> Option<StreamId> {
        self.active_stream
    }

    /// The assistant message currently receiving content.
    #[must_use]
    pub fn open_message(&self) -> Option<&Message> {
        self.open.and_then(|index| self.messages.get(index))
    }

    /// Looks up a message by id.
    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// The error that put the conversation into `error`, if it is there.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        match self.status {
            ConversationStatus::Error => self.last_error.as_deref(),
            _ => None,
        }
    }

    /// The message carrying the pending approval request, if any.
    #[must_use]
    pub fn pending_approval(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_approval_required)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }

    fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Closes the open message without touching its content.
    fn close_open(&mut self) {
        if let Some(index) = self.open.take() {
            if let Some(message) = self.messages.get_mut(index) {
                message.is_streaming = false;
            }
        }
    }

    fn open_assistant(&mut self, stream: StreamId) -> MessageId {
        self.close_open();
        let id = self.allocate_id();
        let index = self.push(Message::open_assistant(id));
        self.open = Some(index);
        self.active_stream = Some(stream);
        self.status = ConversationStatus::Streaming;
        self.last_error = None;
        id
    }

    /// Starts a turn for a user message on `stream`.
    ///
    /// Appends the user message and a placeholder assistant message that
    /// becomes the open message. Any previous open message is closed first.
    pub fn begin_turn(&mut self, stream: StreamId, content: impl Into<String>) -> MessageId {
        self.close_open();
        let user_id = self.allocate_id();
        self.push(Message::user(user_id, content));
        self.open_assistant(stream)
    }

    /// Resumes after an approval decision on `stream`.
    ///
    /// Clears `is_approval_required` everywhere and opens a new assistant
    /// message.
    pub fn begin_approval(&mut self, stream: StreamId) -> MessageId {
        for message in &mut self.messages {
            message.is_approval_required = false;
        }
        self.open_assistant(stream)
    }

    /// Applies one decoded event from `stream`.
    ///
    /// Returns `true` if the state changed. Events from a stream that is not
    /// the active one are discarded.
    pub fn apply(&mut self, stream: StreamId, event: StreamEvent) -> bool {
        if self.active_stream != Some(stream) {
            debug!(stream = %stream, event = event.name(), "Discarding event from inactive stream");
            return false;
        }

        match event {
            StreamEvent::Token { content } => self.with_open(|message| {
                message.content.push_str(&content);
                true
            }),
            StreamEvent::ToolCall(call) => self.with_open(|message| {
                message.tool_calls.push(call);
                true
            }),
            StreamEvent::ToolResult { name, result } => {
                self.with_open(|message| message.resolve_tool_call(&name, result))
            }
            StreamEvent::ApprovalRequired { tool_calls } => self.require_approval(tool_calls),
            StreamEvent::Receipt(receipt) => self.with_open(|message| {
                if message.receipt.is_some() {
                    warn!(message_id = %message.id, "Ignoring second receipt for message");
                    return false;
                }
                message.receipt = Some(receipt);
                true
            }),
            StreamEvent::Done => {
                if self.open.is_none() {
                    return false;
                }
                self.close_open();
                self.status = ConversationStatus::Idle;
                true
            }
            StreamEvent::Error { message } => {
                self.fail(&message);
                true
            }
        }
    }

    fn with_open(&mut self, f: impl FnOnce(&mut Message) -> bool) -> bool {
        match self.open.and_then(|index| self.messages.get_mut(index)) {
            Some(message) => f(message),
            None => false,
        }
    }

    fn require_approval(&mut self, tool_calls: Vec<ToolCall>) -> bool {
        let Some(index) = self.open.take() else {
            return false;
        };
        if let Some(message) = self.messages.get_mut(index) {
            message.is_streaming = false;
            message.is_approval_required = true;
            message.tool_calls = tool_calls;
        }
        self.status = ConversationStatus::AwaitingApproval;
        true
    }

    fn fail(&mut self, error: &str) {
        if let Some(message) = self.open.and_then(|index| self.messages.get_mut(index)) {
            if message.content.is_empty() {
                message.content = format!("Error: {error}");
            }
        }
        self.close_open();
        self.status = ConversationStatus::Error;
        self.last_error = Some(error.to_string());
    }

    /// Handles cancellation of `stream`.
    ///
    /// Content already received is kept as is; the open message is closed and
    /// a streaming status drops back to idle. Returns `false` if `stream` was
    /// not the active stream.
    pub fn cancel(&mut self, stream: StreamId) -> bool {
        if self.active_stream != Some(stream) {
            return false;
        }
        self.close_open();
        self.active_stream = None;
        if self.status == ConversationStatus::Streaming {
            self.status = ConversationStatus::Idle;
        }
        true
    }

    /// Handles the end of `stream`'s body.
    ///
    /// A body that ends while a message is still open is a dropped
    /// connection.
    pub fn finish(&mut self, stream: StreamId) -> bool {
        if self.active_stream != Some(stream) {
            return false;
        }
        if self.open.is_some() {
            warn!(stream = %stream, "Stream ended without a terminal event");
            self.fail(CONNECTION_CLOSED);
        }
        self.active_stream = None;
        true
    }

    /// Appends messages restored from the remote history.
    ///
    /// A history receipt is attached to the most recent assistant message.
    /// Returns the number of messages added.
    pub fn restore(&mut self, history: History) -> usize {
        let first = self.messages.len();

        for entry in history.messages {
            let id = self.allocate_id();
            let message = match entry.role {
                Role::User => Message::user(id, entry.content),
                Role::Assistant => {
                    Message::assistant(id, entry.content, entry.tool_calls.unwrap_or_default())
                }
            };
            self.push(message);
        }

        if let Some(receipt) = history.receipt {
            attach_receipt(&mut self.messages[first..], receipt);
        }

        self.messages.len() - first
    }

    /// Drops all messages and returns to idle.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.status = ConversationStatus::Idle;
        self.active_stream = None;
        self.open = None;
        self.last_error = None;
    }
}

/// Attaches `receipt` to the last assistant message in `messages`.
///
/// Returns `false` when there is no assistant message.
fn attach_receipt(messages: &mut [Message], receipt: Receipt) -> bool {
    match messages.iter_mut().rev().find(|m| m.is_assistant()) {
        Some(message) => {
            message.receipt = Some(receipt);
            true
        }
        None => false,
    }
}
