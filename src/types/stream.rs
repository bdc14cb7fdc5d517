//! Stream event types for agent response handling.
//!
//! The message and approve endpoints answer with a sequence of frames, each
//! made of an `event:` line naming the event and a `data:` line carrying a
//! JSON payload:
//!
//! ```text
//! event: token
//! data: {"content":"Hello"}
//! ```
//!
//! # Event Flow
//!
//! A typical turn looks like:
//!
//! 1. Zero or more `token` events with text fragments
//! 2. `tool_call` / `tool_result` pairs as the agent uses tools
//! 3. Either `approval_required` (the agent paused for a human decision)
//!    or an optional `receipt`
//! 4. `done`, or `error` if the agent failed

use serde::Deserialize;
use serde_json::{json, Value};

use super::message::{Receipt, ToolCall};
use crate::error::{ChatError, ChatResult};

/// Events decoded from a streamed agent response.
///
/// # Examples
///
/// ```rust
/// use pricewise::types::stream::StreamEvent;
///
/// fn handle_event(event: StreamEvent) {
///     match event {
///         StreamEvent::Token { content } => print!("{}", content),
///         StreamEvent::ToolCall(call) => println!("tool: {}", call.name),
///         StreamEvent::Done => println!(),
///         _ => {}
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental text fragment for the open message.
    Token {
        /// The fragment.
        content: String,
    },

    /// The agent invoked a tool.
    ToolCall(ToolCall),

    /// A tool finished and reported its output.
    ToolResult {
        /// Name of the tool that produced the result.
        name: String,
        /// The tool output.
        result: String,
    },

    /// The agent paused until a human approves or denies these calls.
    ApprovalRequired {
        /// The calls awaiting a decision.
        tool_calls: Vec<ToolCall>,
    },

    /// A structured summary of the chosen product.
    Receipt(Receipt),

    /// The response is complete.
    Done,

    /// The agent, the transport, or the decoder failed.
    Error {
        /// Human-readable description.
        message: String,
    },
}

#[derive(Deserialize)]
struct TokenPayload {
    content: String,
}

#[derive(Deserialize)]
struct ToolResultPayload {
    name: String,
    #[serde(default)]
    result: String,
}

#[derive(Deserialize)]
struct ApprovalPayload {
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
}

impl StreamEvent {
    /// Event names understood by the decoder.
    pub const NAMES: [&'static str; 7] = [
        "token",
        "tool_call",
        "tool_result",
        "approval_required",
        "receipt",
        "done",
        "error",
    ];

    /// Builds an event from one frame.
    ///
    /// Returns `Ok(None)` for event names this client does not know, so the
    /// remote service can add events without breaking older clients.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Protocol`] if `data` is not valid JSON or does
    /// not match the payload shape for `event`.
    pub fn from_frame(event: &str, data: &str) -> ChatResult<Option<Self>> {
        if !Self::NAMES.contains(&event) {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(data).map_err(|e| {
            ChatError::protocol(format!("malformed `{event}` payload: {e}"))
        })?;
        let invalid = |e: serde_json::Error| {
            ChatError::protocol(format!("unexpected `{event}` payload: {e}"))
        };

        let parsed = match event {
            "token" => {
                let payload: TokenPayload = serde_json::from_value(value).map_err(invalid)?;
                Self::Token {
                    content: payload.content,
                }
            }
            "tool_call" => Self::ToolCall(serde_json::from_value(value).map_err(invalid)?),
            "tool_result" => {
                let payload: ToolResultPayload =
                    serde_json::from_value(value).map_err(invalid)?;
                Self::ToolResult {
                    name: payload.name,
                    result: payload.result,
                }
            }
            "approval_required" => {
                let payload: ApprovalPayload = serde_json::from_value(value).map_err(invalid)?;
                Self::ApprovalRequired {
                    tool_calls: payload.tool_calls,
                }
            }
            "receipt" => Self::Receipt(serde_json::from_value(value).map_err(invalid)?),
            "done" => Self::Done,
            _ => {
                let payload: ErrorPayload = serde_json::from_value(value).map_err(invalid)?;
                Self::Error {
                    message: payload.message,
                }
            }
        };

        Ok(Some(parsed))
    }

    /// Returns the wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::ToolCall(_) => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::ApprovalRequired { .. } => "approval_required",
            Self::Receipt(_) => "receipt",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Returns the JSON payload carried on the `data:` line.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Token { content } => json!({ "content": content }),
            Self::ToolCall(call) => json!({ "name": call.name, "args": call.args }),
            Self::ToolResult { name, result } => json!({ "name": name, "result": result }),
            Self::ApprovalRequired { tool_calls } => json!({
                "tool_calls": tool_calls
                    .iter()
                    .map(|call| json!({ "name": call.name, "args": call.args }))
                    .collect::<Vec<_>>(),
            }),
            Self::Receipt(receipt) => json!(receipt),
            Self::Done => json!({}),
            Self::Error { message } => json!({ "message": message }),
        }
    }

    /// Renders this event as one wire frame, terminated by a blank line.
    #[must_use]
    pub fn to_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name(), self.payload())
    }

    /// Returns true for events that end the open message.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::Error { .. } | Self::ApprovalRequired { .. }
        )
    }

    /// Extracts the text fragment if this is a token event.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Token { content } => Some(content),
            _ => None,
        }
    }

    /// Extracts the error message if this is an error event.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error { message } => Some(message),
            _ => None,
        }
    }
}
