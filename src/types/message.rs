//! Message, tool call, and receipt types for conversation handling.
//!
//! These are the entities the conversation state machine mutates and the
//! rendering layer reads. Message ids are allocated locally and are never
//! sent to, or matched against, the remote service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Represents a participant role in a conversation.
///
/// # Examples
///
/// ```
/// use pricewise::types::message::Role;
///
/// let role = Role::User;
/// assert_eq!(format!("{}", role), "user");
///
/// let json = serde_json::to_string(&role).unwrap();
/// assert_eq!(json, "\"user\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human user sending messages
    User,
    /// Remote agent responding to messages
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Locally unique message identifier.
///
/// Ids come from a per-conversation counter and are never reused within the
/// lifetime of a [`ConversationState`](crate::app::state::ConversationState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// A tool invocation requested by the agent.
///
/// `args` is opaque to the client; `result` is filled in when a matching
/// `tool_result` event arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool (e.g. `search_product`).
    pub name: String,
    /// Arguments the agent passed to the tool.
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Tool output, once reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolCall {
    /// Creates a tool call without a result.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args,
            result: None,
        }
    }

    /// Returns `true` once a result has been recorded.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }
}

/// Structured summary of the product the agent settled on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub product_name: String,
    pub price: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation_reason: Option<String>,
}

/// A message in the conversation log.
///
/// `content` only grows while `is_streaming` is set; once the message is
/// finalized nothing about it changes except `is_approval_required` being
/// cleared by the approval gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub receipt: Option<Receipt>,
    pub is_streaming: bool,
    pub is_approval_required: bool,
}

impl Message {
    /// Creates a finalized user message.
    #[must_use]
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            receipt: None,
            is_streaming: false,
            is_approval_required: false,
        }
    }

    /// Creates an empty assistant message that is receiving tokens.
    #[must_use]
    pub fn open_assistant(id: MessageId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Vec::new(),
            receipt: None,
            is_streaming: true,
            is_approval_required: false,
        }
    }

    /// Creates a finalized assistant message, as restored from history.
    #[must_use]
    pub fn assistant(id: MessageId, content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            receipt: None,
            is_streaming: false,
            is_approval_required: false,
        }
    }

    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Records `result` on the most recent unresolved call named `name`.
    ///
    /// Returns `false` when every call with that name already has a result
    /// (or none exists); existing results are never overwritten.
    pub fn resolve_tool_call(&mut self, name: &str, result: impl Into<String>) -> bool {
        match self
            .tool_calls
            .iter_mut()
            .rev()
            .find(|call| call.name == name && !call.is_resolved())
        {
            Some(call) => {
                call.result = Some(result.into());
                true
            }
            None => false,
        }
    }
}
