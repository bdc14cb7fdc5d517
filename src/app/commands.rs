//! Input handling for the interactive front end.
//!
//! This module turns one line of user input into either a message for the
//! agent or a slash command:
//! - Plain text is sent as a message
//! - Lines starting with `/` are parsed as commands
//! - `//` escapes a message that itself starts with a slash
//!
//! # Example
//!
//! ```rust
//! use pricewise::app::commands::{parse_input, Command, Input};
//!
//! match parse_input("/approve") {
//!     Input::Command(Command::Approve) => println!("approving"),
//!     Input::Message(text) => println!("sending {text}"),
//!     Input::Empty => {}
//!     Input::Unknown(name) => println!("Unknown: {name}"),
//!     Input::Invalid(e) => println!("Error: {e}"),
//!     Input::Command(_) => {}
//! }
//! ```

use std::fmt;

/// A recognized slash command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Approve the pending tool calls.
    Approve,
    /// Deny the pending tool calls.
    Deny,
    /// Stop the in-flight response.
    Cancel,
    /// Forget the session and start a new conversation.
    New,
    /// Show conversation status.
    Status,
    Help,
    Quit,
}

impl Command {
    /// All commands, in the order they are listed by `/help`.
    pub const ALL: [Command; 7] = [
        Command::Approve,
        Command::Deny,
        Command::Cancel,
        Command::New,
        Command::Status,
        Command::Help,
        Command::Quit,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deny => "deny",
            Self::Cancel => "cancel",
            Self::New => "new",
            Self::Status => "status",
            Self::Help => "help",
            Self::Quit => "quit",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Approve => "Approve the actions the agent is waiting on",
            Self::Deny => "Deny the actions the agent is waiting on",
            Self::Cancel => "Stop the response that is currently streaming",
            Self::New => "Forget this session and start a new conversation",
            Self::Status => "Show the conversation status",
            Self::Help => "Show this help",
            Self::Quit => "Exit",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "approve" | "yes" | "y" => Some(Self::Approve),
            "deny" | "no" | "n" => Some(Self::Deny),
            "cancel" | "stop" => Some(Self::Cancel),
            "new" | "clear" | "reset" => Some(Self::New),
            "status" => Some(Self::Status),
            "help" | "?" => Some(Self::Help),
            "quit" | "exit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// Result of parsing one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Blank line.
    Empty,

    /// Text to send to the agent.
    Message(String),

    /// A recognized slash command.
    Command(Command),

    /// The slash command was not recognized.
    Unknown(String),

    /// The slash command was recognized but used incorrectly.
    Invalid(String),
}

/// Parses one line of user input.
#[must_use]
pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return Input::Empty;
    }

    if let Some(escaped) = trimmed.strip_prefix("//") {
        return Input::Message(format!("/{escaped}"));
    }

    let Some(without_slash) = trimmed.strip_prefix('/') else {
        return Input::Message(trimmed.to_string());
    };

    let mut parts = without_slash.split_whitespace();
    let Some(name) = parts.next() else {
        return Input::Invalid("Empty command".to_string());
    };

    let Some(command) = Command::from_name(&name.to_ascii_lowercase()) else {
        return Input::Unknown(name.to_string());
    };

    if parts.next().is_some() {
        return Input::Invalid(format!("{command} takes no arguments"));
    }

    Input::Command(command)
}

/// Help text listing every command.
#[must_use]
pub fn help_text() -> String {
    let mut output = String::from("Type a message to talk to the agent.\n\nCommands:\n");
    for command in Command::ALL {
        output.push_str(&format!("  {:<10} {}\n", command.to_string(), command.description()));
    }
    output.push_str("\nStart a message with // to send a leading slash.");
    output
}
