//! Tests for the conversation state machine.
//!
//! These drive [`ConversationState`] through whole event sequences, the way a
//! response stream would, and check the invariants that must hold between
//! events.

use pretty_assertions::assert_eq;
use pricewise::api::{History, HistoryMessage};
use pricewise::app::state::{ConversationState, ConversationStatus, StreamId};
use pricewise::types::{Receipt, Role, StreamEvent, ToolCall};
use proptest::prelude::*;
use serde_json::Map;

const S1: StreamId = StreamId(1);
const S2: StreamId = StreamId(2);

fn token(text: &str) -> StreamEvent {
    StreamEvent::Token {
        content: text.to_string(),
    }
}

fn call(name: &str) -> ToolCall {
    ToolCall::new(name, Map::new())
}

fn result(name: &str, text: &str) -> StreamEvent {
    StreamEvent::ToolResult {
        name: name.to_string(),
        result: text.to_string(),
    }
}

fn receipt(product: &str) -> Receipt {
    Receipt {
        product_name: product.to_string(),
        price: 10.0,
        currency: "EUR".to_string(),
        average_rating: None,
        price_range: None,
        recommendation_reason: None,
    }
}

fn streaming_count(state: &ConversationState) -> usize {
    state.messages().iter().filter(|m| m.is_streaming).count()
}

/// A full search turn: tool call, result, tokens, receipt, done.
#[test]
fn test_full_search_turn() {
    let mut state = ConversationState::new();
    state.begin_turn(S1, "cheapest usb-c cable");

    for event in [
        StreamEvent::ToolCall(call("search_product")),
        result("search_product", "12 offers"),
        token("The cheapest "),
        token("is 4.99 EUR."),
        StreamEvent::Receipt(receipt("Anker cable")),
        StreamEvent::Done,
    ] {
        state.apply(S1, event);
        assert!(streaming_count(&state) <= 1);
    }

    assert_eq!(state.status(), ConversationStatus::Idle);
    let reply = state.messages().last().unwrap();
    assert_eq!(reply.content, "The cheapest is 4.99 EUR.");
    assert_eq!(reply.tool_calls[0].result.as_deref(), Some("12 offers"));
    assert_eq!(reply.receipt.as_ref().unwrap().product_name, "Anker cable");
}

/// Results bind to the most recent unresolved call with the same name.
#[test]
fn test_repeated_tool_results_bind_latest_unresolved() {
    let mut state = ConversationState::new();
    state.begin_turn(S1, "compare");
    state.apply(S1, StreamEvent::ToolCall(call("search_product")));
    state.apply(S1, StreamEvent::ToolCall(call("search_product")));

    state.apply(S1, result("search_product", "second"));
    state.apply(S1, result("search_product", "first"));

    let calls = &state.open_message().unwrap().tool_calls;
    assert_eq!(calls[1].result.as_deref(), Some("second"));
    assert_eq!(calls[0].result.as_deref(), Some("first"));

    // Both are resolved; a third result changes nothing.
    assert!(!state.apply(S1, result("search_product", "third")));
}

#[test]
fn test_approval_round_trip() {
    let mut state = ConversationState::new();
    state.begin_turn(S1, "buy the cable");
    state.apply(
        S1,
        StreamEvent::ApprovalRequired {
            tool_calls: vec![call("add_to_cart")],
        },
    );
    state.apply(S1, StreamEvent::Done);
    assert_eq!(state.status(), ConversationStatus::AwaitingApproval);
    let paused = state.pending_approval().unwrap().id;

    let resumed = state.begin_approval(S2);
    state.apply(S2, token("Added."));
    state.apply(S2, StreamEvent::Done);

    assert_ne!(paused, resumed);
    assert!(state.pending_approval().is_none());
    assert!(!state.message(paused).unwrap().is_approval_required);
    assert_eq!(state.message(resumed).unwrap().content, "Added.");
    assert_eq!(state.status(), ConversationStatus::Idle);
}

/// Events that arrive with no open message are ignored.
#[test]
fn test_events_without_open_message_ignored() {
    let mut state = ConversationState::new();
    state.begin_turn(S1, "hi");
    state.apply(S1, StreamEvent::Done);

    assert!(!state.apply(S1, token("stray")));
    assert!(!state.apply(S1, StreamEvent::ToolCall(call("x"))));
    assert!(!state.apply(S1, StreamEvent::Receipt(receipt("x"))));
    assert_eq!(state.messages().last().unwrap().content, "");
}

#[test]
fn test_history_without_assistant_drops_receipt() {
    let mut state = ConversationState::new();
    let restored = state.restore(History {
        messages: vec![HistoryMessage {
            id: None,
            role: Role::User,
            content: "hello".into(),
            tool_calls: None,
        }],
        receipt: Some(receipt("orphan")),
    });

    assert_eq!(restored, 1);
    assert!(state.messages().iter().all(|m| m.receipt.is_none()));
}

#[test]
fn test_restore_then_continue() {
    let mut state = ConversationState::new();
    state.restore(History {
        messages: vec![
            HistoryMessage {
                id: Some("u".into()),
                role: Role::User,
                content: "hello".into(),
                tool_calls: None,
            },
            HistoryMessage {
                id: Some("a".into()),
                role: Role::Assistant,
                content: "hi there".into(),
                tool_calls: None,
            },
        ],
        receipt: None,
    });

    state.begin_turn(S1, "more");
    state.apply(S1, token("sure"));
    state.apply(S1, StreamEvent::Done);

    let contents: Vec<&str> = state.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hello", "hi there", "more", "sure"]);
}

proptest! {
    /// No event sequence leaves more than one message streaming, and content
    /// of the open message only ever grows.
    #[test]
    fn prop_single_open_message(ops in proptest::collection::vec(0u8..8, 0..40)) {
        let mut state = ConversationState::new();
        let mut stream = StreamId(0);
        let mut last_len = 0usize;

        for op in ops {
            match op {
                0 => {
                    stream = StreamId(stream.0 + 1);
                    state.begin_turn(stream, "q");
                    last_len = 0;
                }
                1 => { state.apply(stream, token("ab")); }
                2 => { state.apply(stream, StreamEvent::ToolCall(call("t"))); }
                3 => { state.apply(stream, result("t", "r")); }
                4 => { state.apply(stream, StreamEvent::Done); }
                5 => { state.apply(stream, StreamEvent::Error { message: "e".into() }); }
                6 => { state.cancel(stream); }
                _ => {
                    if state.status() == ConversationStatus::AwaitingApproval {
                        stream = StreamId(stream.0 + 1);
                        state.begin_approval(stream);
                        last_len = 0;
                    } else {
                        state.apply(stream, StreamEvent::ApprovalRequired { tool_calls: vec![call("t")] });
                    }
                }
            }

            prop_assert!(streaming_count(&state) <= 1);
            if let Some(open) = state.open_message() {
                prop_assert!(open.content.len() >= last_len);
                last_len = open.content.len();
                prop_assert_eq!(state.status(), ConversationStatus::Streaming);
            }
        }
    }
}
