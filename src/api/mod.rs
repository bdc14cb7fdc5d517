//! HTTP client for the agent's chat API.
//!
//! Four endpoints, all relative to the configured base URL:
//!
//! - `POST /sessions` creates a session
//! - `GET /sessions/{id}/messages` returns the conversation history
//! - `POST /sessions/{id}/messages` streams the reply to a user message
//! - `POST /sessions/{id}/approve` streams the continuation after a decision
//!
//! Streaming endpoints return the raw [`reqwest::Response`]; status handling
//! and decoding are left to the request controller so that a non-success
//! status can be turned into a conversation error before any decoding.

pub mod decoder;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChatError, ChatResult};
use crate::types::{Receipt, Role, ToolCall};

pub use decoder::{decode_stream, FrameDecoder};

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    session_id: String,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct ApprovalRequest {
    approved: bool,
}

/// One entry of the conversation history returned by the remote service.
///
/// Remote ids are accepted but never used as local message ids.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "toolCalls")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Conversation history used to rehydrate a persisted session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct History {
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    #[serde(default)]
    pub receipt: Option<Receipt>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    message: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Returns the base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL of `/sessions/{id}/{endpoint}`; the id is percent-encoded.
    fn session_url(&self, session_id: &str, endpoint: &str) -> String {
        self.url(&format!(
            "/sessions/{}/{endpoint}",
            urlencoding::encode(session_id)
        ))
    }

    /// Asks the remote service for a new session id.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::SessionCreation`] on a non-success status or an
    /// unreadable body, and [`ChatError::Transport`] if the request fails.
    pub async fn create_session(&self) -> ChatResult<String> {
        let response = self.client.post(self.url("/sessions")).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response).await;
            return Err(ChatError::session_creation(format!("{status}: {detail}")));
        }

        let body: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::session_creation(format!("unreadable response: {e}")))?;
        debug!(session_id = %body.session_id, "Session created");
        Ok(body.session_id)
    }

    /// Fetches the conversation history of `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::SessionNotFound`] on 404, [`ChatError::Remote`]
    /// on any other non-success status.
    pub async fn fetch_history(&self, session_id: &str) -> ChatResult<History> {
        let response = self
            .client
            .get(self.session_url(session_id, "messages"))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ChatError::session_not_found(session_id));
        }
        if !status.is_success() {
            let detail = error_detail(response).await;
            return Err(ChatError::remote(Some(status.as_u16()), detail));
        }

        let history = response.json::<History>().await.map_err(|e| {
            ChatError::protocol(format!("unreadable history for '{session_id}': {e}"))
        })?;
        Ok(history)
    }

    /// Posts a user message; the response body is an event stream.
    pub async fn send_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> ChatResult<reqwest::Response> {
        let response = self
            .client
            .post(self.session_url(session_id, "messages"))
            .header("accept", "text/event-stream")
            .json(&MessageRequest { content })
            .send()
            .await?;
        Ok(response)
    }

    /// Posts an approval decision; the response body is an event stream.
    pub async fn approve(&self, session_id: &str, approved: bool) -> ChatResult<reqwest::Response> {
        let response = self
            .client
            .post(self.session_url(session_id, "approve"))
            .header("accept", "text/event-stream")
            .json(&ApprovalRequest { approved })
            .send()
            .await?;
        Ok(response)
    }
}

/// Extracts a human-readable error detail from a failed response.
///
/// Understands `{"detail": "..."}` and `{"message": "..."}` bodies; anything
/// else falls back to the status line, or the raw body when it is short text.
pub async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    parse_error_detail(status, &body)
}

fn parse_error_detail(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        match parsed.detail {
            Some(serde_json::Value::String(detail)) => return detail,
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
        if let Some(message) = parsed.message {
            return message;
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 200 && !trimmed.starts_with('<') {
        return trimmed.to_string();
    }

    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}
