//! Tests for the event-stream decoder.
//!
//! Covers frame pairing rules and, with proptest, that chunk boundaries
//! never change what is decoded.

use futures::stream::{self, StreamExt};
use pricewise::api::{decode_stream, FrameDecoder};
use pricewise::types::{Receipt, StreamEvent, ToolCall};
use proptest::prelude::*;
use serde_json::Map;

fn token(text: &str) -> StreamEvent {
    StreamEvent::Token {
        content: text.to_string(),
    }
}

fn encode(events: &[StreamEvent]) -> Vec<u8> {
    events
        .iter()
        .map(StreamEvent::to_frame)
        .collect::<String>()
        .into_bytes()
}

/// Feeds `bytes` split at `cuts` and returns everything decoded.
fn decode_split(bytes: &[u8], cuts: &[usize]) -> Vec<StreamEvent> {
    let mut decoder = FrameDecoder::new();
    let mut events = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        let cut = cut.min(bytes.len()).max(start);
        events.extend(decoder.push(&bytes[start..cut]));
        start = cut;
    }
    events.extend(decoder.push(&bytes[start..]));
    events.extend(decoder.finish());
    events
}

// ============================================================================
// Framing
// ============================================================================

#[test]
fn test_every_event_kind_decodes() {
    let events = vec![
        token("Looking"),
        StreamEvent::ToolCall(ToolCall::new("search_product", Map::new())),
        StreamEvent::ToolResult {
            name: "search_product".into(),
            result: "[]".into(),
        },
        StreamEvent::Receipt(Receipt {
            product_name: "Echo Dot".into(),
            price: 49.99,
            currency: "USD".into(),
            average_rating: None,
            price_range: Some("$40-$60".into()),
            recommendation_reason: None,
        }),
        StreamEvent::ApprovalRequired {
            tool_calls: vec![ToolCall::new("add_to_cart", Map::new())],
        },
        StreamEvent::Error {
            message: "nope".into(),
        },
        StreamEvent::Done,
    ];

    assert_eq!(decode_split(&encode(&events), &[]), events);
}

#[test]
fn test_partial_line_held_back() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(b"event: token\ndata: {\"content\":").is_empty());
    assert!(decoder.buffered_len() > 0);

    let events = decoder.push(b"\"hi\"}\n\n");
    assert_eq!(events, vec![token("hi")]);
    assert_eq!(decoder.buffered_len(), 0);
}

#[test]
fn test_event_name_survives_chunk_boundary() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(b"event: token\n").is_empty());
    assert_eq!(
        decoder.push(b"data: {\"content\":\"x\"}\n"),
        vec![token("x")]
    );
}

#[test]
fn test_data_without_event_dropped() {
    let bytes = b"data: {\"content\":\"orphan\"}\n\nevent: token\ndata: {\"content\":\"kept\"}\n\n";
    assert_eq!(decode_split(bytes, &[]), vec![token("kept")]);
}

#[test]
fn test_event_name_cleared_after_dispatch() {
    let bytes = b"event: token\ndata: {\"content\":\"a\"}\ndata: {\"content\":\"b\"}\n\n";
    assert_eq!(decode_split(bytes, &[]), vec![token("a")]);
}

#[test]
fn test_blank_line_resets_pending_event() {
    let bytes = b"event: token\n\ndata: {\"content\":\"lost\"}\n\n";
    assert!(decode_split(bytes, &[]).is_empty());
}

#[test]
fn test_unknown_event_ignored() {
    let bytes = b"event: heartbeat\ndata: {}\n\nevent: done\ndata: {}\n\n";
    assert_eq!(decode_split(bytes, &[]), vec![StreamEvent::Done]);
}

#[test]
fn test_comments_crlf_and_missing_space() {
    let bytes = b": keep-alive\r\nevent:token\r\ndata:{\"content\":\"ok\"}\r\n\r\n";
    assert_eq!(decode_split(bytes, &[]), vec![token("ok")]);
}

#[test]
fn test_malformed_json_poisons_decoder() {
    let mut decoder = FrameDecoder::new();
    let events = decoder.push(b"event: token\ndata: {bad\n\nevent: done\ndata: {}\n\n");

    assert_eq!(events.len(), 1);
    assert!(events[0].error().is_some());
    assert!(decoder.is_failed());
    assert!(decoder.push(b"event: done\ndata: {}\n\n").is_empty());
    assert!(decoder.finish().is_empty());
}

#[test]
fn test_unterminated_last_line_flushed_at_end() {
    let bytes = b"event: done\ndata: {}";
    assert_eq!(decode_split(bytes, &[]), vec![StreamEvent::Done]);
}

// ============================================================================
// Async stream
// ============================================================================

#[tokio::test]
async fn test_decode_stream_in_order() {
    let bytes = encode(&[token("a"), token("b"), StreamEvent::Done]);
    let chunks: Vec<Result<Vec<u8>, String>> = bytes.chunks(7).map(|c| Ok(c.to_vec())).collect();

    let events: Vec<StreamEvent> = decode_stream(stream::iter(chunks)).collect().await;

    assert_eq!(events, vec![token("a"), token("b"), StreamEvent::Done]);
}

#[tokio::test]
async fn test_decode_stream_read_error_ends_stream() {
    let chunks: Vec<Result<&[u8], &str>> = vec![
        Ok(&b"event: token\ndata: {\"content\":\"a\"}\n\n"[..]),
        Err("reset by peer"),
        Ok(&b"event: done\ndata: {}\n\n"[..]),
    ];

    let events: Vec<StreamEvent> = decode_stream(stream::iter(chunks)).collect().await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], token("a"));
    assert_eq!(events[1].error(), Some("connection dropped: reset by peer"));
}

#[tokio::test]
async fn test_decode_stream_stops_after_protocol_error() {
    let chunks: Vec<Result<&[u8], &str>> = vec![
        Ok(&b"event: receipt\ndata: {\"price\": \"free\"}\n\n"[..]),
        Ok(&b"event: done\ndata: {}\n\n"[..]),
    ];

    let events: Vec<StreamEvent> = decode_stream(stream::iter(chunks)).collect().await;

    assert_eq!(events.len(), 1);
    assert!(events[0].error().unwrap().contains("receipt"));
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Concatenating decoded token contents reproduces the original text.
    #[test]
    fn prop_tokens_concatenate(parts in proptest::collection::vec(".{0,12}", 0..12)) {
        let mut events: Vec<StreamEvent> = parts.iter().map(|p| token(p)).collect();
        events.push(StreamEvent::Done);

        let decoded = decode_split(&encode(&events), &[]);
        let text: String = decoded.iter().filter_map(StreamEvent::content).collect();

        prop_assert_eq!(text, parts.concat());
        prop_assert_eq!(decoded.last(), Some(&StreamEvent::Done));
    }

    /// Splitting the body at arbitrary byte offsets never changes the result.
    #[test]
    fn prop_chunking_is_invisible(
        parts in proptest::collection::vec("[a-zé世 \\n\"]{0,8}", 1..8),
        mut cuts in proptest::collection::vec(0usize..400, 0..20),
    ) {
        let mut events: Vec<StreamEvent> = parts.iter().map(|p| token(p)).collect();
        events.push(StreamEvent::Done);
        let bytes = encode(&events);

        cuts.sort_unstable();
        prop_assert_eq!(decode_split(&bytes, &cuts), events);
    }
}
