//! Common test utilities and fixtures for Pricewise.
//!
//! This module provides shared test infrastructure including:
//! - A temp-dir backed test context with a session state file
//! - Event-stream body builders
//! - Mock server helpers (wiremock, plus a raw TCP server for bodies that
//!   must arrive in controlled pieces)

#![allow(dead_code)]

use pricewise::api::ApiClient;
use pricewise::session::SessionStorage;
use pricewise::types::{StreamEvent, ToolCall};
use pricewise::ChatSession;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test context providing common setup for integration tests.
pub struct TestContext {
    /// Temporary directory for test file operations.
    pub temp_dir: tempfile::TempDir,
}

impl TestContext {
    /// Creates a new test context with a temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            temp_dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    /// Returns the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    /// Location of the persisted session file.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.temp_dir.path().join("state/session.json")
    }

    #[must_use]
    pub fn storage(&self) -> SessionStorage {
        SessionStorage::new(self.state_file())
    }

    /// Creates a chat session talking to `base_url`.
    #[must_use]
    pub fn chat(&self, base_url: &str) -> ChatSession {
        ChatSession::new(ApiClient::new(base_url), self.storage())
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn token(text: &str) -> StreamEvent {
    StreamEvent::Token {
        content: text.to_string(),
    }
}

pub fn tool_call(name: &str, args: Value) -> ToolCall {
    let args: Map<String, Value> = args.as_object().cloned().unwrap_or_default();
    ToolCall::new(name, args)
}

/// Renders events as an event-stream body.
pub fn sse_body(events: &[StreamEvent]) -> String {
    events.iter().map(StreamEvent::to_frame).collect()
}

/// A 200 response carrying `events` as an event stream.
pub fn sse_response(events: &[StreamEvent]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(sse_body(events), "text/event-stream")
}

/// Mounts `POST /sessions` answering with `session_id` once.
pub async fn mount_create_session(server: &MockServer, session_id: &str) {
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "session_id": session_id })))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Mounts `POST /sessions/{id}/messages` answering with `events`.
pub async fn mount_message_stream(server: &MockServer, session_id: &str, events: &[StreamEvent]) {
    Mock::given(method("POST"))
        .and(path(format!("/sessions/{session_id}/messages")))
        .respond_with(sse_response(events))
        .mount(server)
        .await;
}

/// Starts a raw HTTP server for bodies that must arrive in pieces.
///
/// `POST /sessions` answers with session `raw-1`. Every other request gets an
/// event-stream response whose body is written one chunk at a time. With
/// `hold_open` the connection stays open after the last chunk; otherwise it is
/// closed, ending the body.
pub async fn spawn_chunked_server(chunks: Vec<Vec<u8>>, hold_open: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("test server has no address");

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let chunks = chunks.clone();
            tokio::spawn(async move {
                let request_line = read_request(&mut socket).await;

                if request_line.starts_with("POST /sessions ") {
                    let body = r#"{"session_id":"raw-1"}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    return;
                }

                let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for chunk in chunks {
                    if socket.write_all(&chunk).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                if hold_open {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            });
        }
    });

    format!("http://{addr}")
}

/// Reads one request and returns its request line.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut scratch = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        match socket.read(&mut scratch).await {
            Ok(0) | Err(_) => return String::new(),
            Ok(n) => buffer.extend_from_slice(&scratch[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + 4 + content_length {
        match socket.read(&mut scratch).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.extend_from_slice(&scratch[..n]),
        }
    }

    head.lines().next().unwrap_or_default().to_string()
}

/// Splits `bytes` into pieces of at most `size` bytes.
pub fn split_every(bytes: &[u8], size: usize) -> Vec<Vec<u8>> {
    bytes.chunks(size.max(1)).map(<[u8]>::to_vec).collect()
}
