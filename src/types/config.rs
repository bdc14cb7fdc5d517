//! Configuration types for Pricewise.
//!
//! This module contains the configuration used to initialize the chat
//! session and the terminal front end.

use std::path::PathBuf;

use crate::error::{ChatError, ChatResult};

/// Default base URL of the agent's chat API.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/chat";

/// Controls what happens to a persisted session on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumeMode {
    /// Rehydrate the persisted session, if the remote still knows it.
    #[default]
    Persisted,

    /// Discard any persisted session and start fresh.
    Fresh,
}

/// Application configuration.
///
/// # Examples
///
/// ```
/// use pricewise::types::config::{Config, ResumeMode};
/// use std::path::PathBuf;
///
/// let config = Config::new("http://localhost:8000/chat", PathBuf::from("/tmp/session.json"))
///     .with_resume_mode(ResumeMode::Fresh);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the chat API; endpoints are resolved relative to it.
    pub api_url: String,

    /// File holding the persisted session id.
    pub state_file: PathBuf,

    /// Session resume behavior on startup.
    pub resume_mode: ResumeMode,

    /// Optional prompt submitted as soon as the session is ready.
    pub initial_prompt: Option<String>,

    /// Whether to run in print mode (non-interactive).
    ///
    /// When true (and `initial_prompt` is set):
    /// - Sends the prompt to the agent
    /// - Streams and prints the response to stdout
    /// - Exits when the response is complete or paused for approval
    pub print_mode: bool,
}

impl Config {
    /// Creates a new configuration with the given settings.
    #[must_use]
    pub fn new(api_url: impl Into<String>, state_file: PathBuf) -> Self {
        Self {
            api_url: api_url.into(),
            state_file,
            resume_mode: ResumeMode::Persisted,
            initial_prompt: None,
            print_mode: false,
        }
    }

    /// Sets the resume mode for this configuration.
    #[must_use]
    pub fn with_resume_mode(mut self, mode: ResumeMode) -> Self {
        self.resume_mode = mode;
        self
    }

    /// Sets the prompt submitted on startup.
    #[must_use]
    pub fn with_initial_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.initial_prompt = Some(prompt.into());
        self
    }

    /// Enables or disables print mode.
    #[must_use]
    pub fn with_print_mode(mut self, print_mode: bool) -> Self {
        self.print_mode = print_mode;
        self
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`] if the API URL is not http(s), and
    /// [`ChatError::Storage`] if the state file path has no file name.
    pub fn validate(&self) -> ChatResult<()> {
        let url = reqwest::Url::parse(&self.api_url)
            .map_err(|e| ChatError::transport(format!("invalid API URL '{}': {e}", self.api_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChatError::transport(format!(
                "unsupported API URL scheme '{}'",
                url.scheme()
            )));
        }
        if self.state_file.file_name().is_none() {
            return Err(ChatError::storage(
                &self.state_file,
                "state file path must name a file",
            ));
        }
        Ok(())
    }
}
