//! Core type definitions for Pricewise.
//!
//! This module contains the fundamental data types used throughout the client,
//! organized into submodules by domain:
//!
//! - [`config`] - Application configuration types
//! - [`message`] - Messages, tool calls and receipts
//! - [`stream`] - Stream event types for agent response handling
//!
//! # Re-exports
//!
//! Common types are re-exported at the module level for convenience:
//!
//! ```
//! use pricewise::types::{Message, Role, StreamEvent};
//! ```

pub mod config;
pub mod message;
pub mod stream;

// Re-export common types for convenience
pub use config::Config;
pub use message::{Message, MessageId, Receipt, Role, ToolCall};
pub use stream::StreamEvent;
