//! Centralized error types for Pricewise.
//!
//! This module provides a unified error type (`ChatError`) covering every
//! failure the session core can observe. Errors are grouped into categories
//! that decide how they surface:
//!
//! - **Session** errors are recovered locally (stale ids are discarded).
//! - **Transport** and **Protocol** errors become one terminal `error`
//!   transition on the conversation.
//! - **Cancellation** is never shown to the user.
//! - **UserVisible** errors carry a detail message that is displayed verbatim.
//!
//! # Example
//!
//! ```
//! use pricewise::error::{ChatError, ErrorCategory};
//!
//! let err = ChatError::remote(Some(500), "agent unavailable");
//! assert_eq!(err.category(), ErrorCategory::UserVisible);
//! assert_eq!(err.user_message(), "agent unavailable");
//! ```

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using `ChatError`.
pub type ChatResult<T> = Result<T, ChatError>;

/// Coarse classification of a [`ChatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Session creation or rehydration failed.
    Session,
    /// The connection failed or dropped.
    Transport,
    /// A frame or payload could not be understood.
    Protocol,
    /// The request was cancelled locally.
    Cancellation,
    /// The remote service reported an error with a detail message.
    UserVisible,
    /// Local persistence failed.
    Storage,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Session => "session",
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Cancellation => "cancellation",
            Self::UserVisible => "remote",
            Self::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Centralized error type for the chat session core.
#[derive(Debug, Error)]
pub enum ChatError {
    // ============== Session Errors ==============
    /// The remote service refused to create a session.
    #[error("session: failed to create session: {message}")]
    SessionCreation {
        /// Description of the failure.
        message: String,
    },

    /// The remote service does not know the session.
    #[error("session: session '{session_id}' not found")]
    SessionNotFound {
        /// The unknown session id.
        session_id: String,
    },

    /// An operation needed a session but none is active.
    #[error("session: no active session")]
    NoSession,

    /// A message was sent while a tool call is waiting for approval.
    #[error("session: a tool call is awaiting approval; approve or deny it first")]
    ApprovalPending,

    /// A session id failed validation.
    #[error("session: invalid session id: {reason}")]
    InvalidSessionId {
        /// Why the id was rejected.
        reason: String,
    },

    // ============== Stream Errors ==============
    /// Network error while talking to the remote service.
    #[error("transport: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// Malformed frame or unparsable payload.
    #[error("protocol: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The request was superseded or cancelled by the user.
    #[error("request cancelled")]
    Cancelled,

    /// The remote service returned an error detail.
    #[error("remote: {message}")]
    Remote {
        /// HTTP status, when the error came from a status line.
        status: Option<u16>,
        /// Detail message, shown verbatim.
        message: String,
    },

    // ============== Storage Errors ==============
    /// Reading or writing the persisted session failed.
    #[error("storage: {message} ({})", .path.display())]
    Storage {
        /// The file being accessed.
        path: PathBuf,
        /// Description of the I/O failure.
        message: String,
    },
}

// ============== Constructor Methods ==============

impl ChatError {
    /// Creates a session creation error.
    #[must_use]
    pub fn session_creation(message: impl Into<String>) -> Self {
        Self::SessionCreation {
            message: message.into(),
        }
    }

    /// Creates a session-not-found error.
    #[must_use]
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Creates an invalid session id error.
    #[must_use]
    pub fn invalid_session_id(reason: impl Into<String>) -> Self {
        Self::InvalidSessionId {
            reason: reason.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a remote (user-visible) error.
    #[must_use]
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
        }
    }
}

// ============== Category Methods ==============

impl ChatError {
    /// Returns the category this error belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SessionCreation { .. }
            | Self::SessionNotFound { .. }
            | Self::NoSession
            | Self::ApprovalPending
            | Self::InvalidSessionId { .. } => ErrorCategory::Session,
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::Protocol { .. } => ErrorCategory::Protocol,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::Remote { .. } => ErrorCategory::UserVisible,
            Self::Storage { .. } => ErrorCategory::Storage,
        }
    }

    /// Returns `true` if retrying the same action may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::SessionNotFound { .. } => true,
            Self::Remote {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns `true` if this error should reach the user at all.
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the remote service no longer knows the session.
    #[must_use]
    pub fn is_session_gone(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound { .. }
                | Self::Remote {
                    status: Some(404),
                    ..
                }
        )
    }

    /// Text used when an error replaces the content of an empty message.
    ///
    /// Remote details are returned verbatim; everything else uses the
    /// display form.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Remote { message, .. } => message.clone(),
            Self::Transport { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

// ============== Conversion Implementations ==============

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_connect() {
            format!("connection failed: {err}")
        } else if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_body() || err.is_decode() {
            format!("connection dropped: {err}")
        } else {
            err.to_string()
        };
        Self::Transport { message }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol {
            message: err.to_string(),
        }
    }
}

// ============== Unit Tests ==============
