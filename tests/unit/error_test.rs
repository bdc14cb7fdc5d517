//! Tests for Pricewise error types.
//!
//! These tests verify the behavior of the centralized error types module,
//! ensuring proper Display, Error trait implementations, and conversions.

use pricewise::error::{ChatError, ChatResult, ErrorCategory};

#[cfg(test)]
mod error_type_tests {
    use super::*;

    // ============== Construction Tests ==============

    #[test]
    fn test_session_errors_display() {
        let err = ChatError::session_creation("503 Service Unavailable: busy");
        assert!(err.to_string().contains("failed to create session"));
        assert!(err.to_string().contains("busy"));

        let err = ChatError::session_not_found("abc");
        assert!(err.to_string().contains("'abc'"));

        assert!(ChatError::ApprovalPending.to_string().contains("approval"));
    }

    #[test]
    fn test_invalid_session_id() {
        let err = ChatError::invalid_session_id("checksum mismatch");
        assert_eq!(err.category(), ErrorCategory::Session);
        assert!(err.to_string().contains("checksum mismatch"));
    }

    // ============== Conversion Tests ==============

    #[test]
    fn test_from_serde_json_error_is_protocol() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: ChatError = json_err.into();
        assert_eq!(err.category(), ErrorCategory::Protocol);
    }

    #[test]
    fn test_question_mark_propagation() {
        fn parse(input: &str) -> ChatResult<serde_json::Value> {
            Ok(serde_json::from_str(input)?)
        }

        assert!(parse("{}").is_ok());
        assert!(matches!(parse("nope"), Err(ChatError::Protocol { .. })));
    }

    // ============== Trait Tests ==============

    #[test]
    fn test_error_is_std_error() {
        fn assert_error<E: std::error::Error + Send + Sync + 'static>(_: &E) {}
        assert_error(&ChatError::Cancelled);
    }

    #[test]
    fn test_user_message_for_transport_is_bare() {
        let err = ChatError::transport("connection failed: refused");
        assert_eq!(err.user_message(), "connection failed: refused");
        assert_eq!(err.to_string(), "transport: connection failed: refused");
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::UserVisible.to_string(), "remote");
        assert_eq!(ErrorCategory::Cancellation.to_string(), "cancellation");
    }
}
