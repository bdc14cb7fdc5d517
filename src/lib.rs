//! Pricewise - streaming client for a product-search agent
//!
//! The library holds the client-side session core: the event-stream decoder,
//! the session store, the conversation state machine with its approval gate,
//! and the request controller that keeps a single stream alive at a time.
//! The `pricewise` binary is a thin terminal front end over [`app::ChatSession`].

pub mod api;
pub mod app;
pub mod error;
pub mod session;
pub mod types;
pub mod util;

// Re-export core types for convenient access
pub use app::{ChatSession, StreamHandle, StreamOutcome};
pub use error::{ChatError, ChatResult};
pub use types::{Config, Message, Role, StreamEvent};
