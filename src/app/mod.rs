//! Application core
//!
//! [`ChatSession`] ties the pieces together: it owns the session store, the
//! observable conversation state and the request controller, and exposes the
//! user actions (send a message, approve or deny, cancel, start over).
//! [`run`] is the line-mode terminal front end built on top of it.

use anyhow::{bail, Context, Result};
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub mod commands;
pub mod controller;
pub mod render;
pub mod state;
pub mod store;

use commands::{help_text, parse_input, Command, Input};
use controller::{RequestController, RequestTicket, SessionContext};
use render::{status_line, Renderer};
use state::{ConversationState, ConversationStatus};
use store::StateStore;

use crate::api::ApiClient;
use crate::error::{ChatError, ChatResult};
use crate::session::{SessionStorage, SessionStore};
use crate::types::config::ResumeMode;

pub use controller::{StreamHandle, StreamOutcome};
pub use crate::types::Config;

/// A conversation with the remote agent.
pub struct ChatSession {
    api: ApiClient,
    sessions: SessionStore,
    store: StateStore,
    requests: RequestController,
}

impl ChatSession {
    #[must_use]
    pub fn new(api: ApiClient, storage: SessionStorage) -> Self {
        Self {
            api,
            sessions: SessionStore::new(storage),
            store: StateStore::new(),
            requests: RequestController::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ApiClient::new(&config.api_url),
            SessionStorage::new(config.state_file.clone()),
        )
    }

    /// Returns a receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.store.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> ConversationState {
        self.store.snapshot()
    }

    #[must_use]
    pub fn status(&self) -> ConversationStatus {
        self.store.status()
    }

    /// The active session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.sessions.current()
    }

    /// Restores the persisted session and its history.
    ///
    /// Returns `true` if a session was restored. A session the remote no
    /// longer recognizes is discarded and the conversation stays empty.
    ///
    /// # Errors
    ///
    /// Only local storage failures are returned.
    pub async fn rehydrate(&mut self) -> ChatResult<bool> {
        match self.sessions.rehydrate(&self.api).await? {
            Some(history) => {
                self.requests.dispose();
                self.store.reset();
                let restored = self.store.restore(history);
                debug!(restored, "Restored conversation history");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sends a user message and streams the reply.
    ///
    /// Any in-flight request is cancelled first. A session is created if
    /// there is none, or if the previous one was reported unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ApprovalPending`] while the agent waits for an
    /// approval decision, and session errors if no session can be created.
    /// Failures of the request itself are reported through the conversation
    /// state and the returned handle's [`StreamOutcome`].
    pub async fn send_message(&mut self, content: &str) -> ChatResult<StreamHandle> {
        if self.store.status() == ConversationStatus::AwaitingApproval {
            return Err(ChatError::ApprovalPending);
        }

        let session_id = self.sessions.ensure(&self.api).await?;
        let ticket = self.requests.supersede();
        self.store.begin_turn(ticket.stream, content.to_string());
        info!(session_id = %session_id, stream = %ticket.stream, "Sending message");

        let api = self.api.clone();
        let content = content.to_string();
        let target = session_id.clone();
        Ok(self.spawn(ticket, session_id, async move {
            api.send_message(&target, &content).await
        }))
    }

    /// Sends an approval decision and streams the continuation.
    ///
    /// Does nothing and returns `None` when there is no active session.
    pub fn approve(&mut self, approved: bool) -> Option<StreamHandle> {
        let Some(session_id) = self.sessions.current().map(str::to_string) else {
            debug!(approved, "Ignoring approval decision without a session");
            return None;
        };

        let ticket = self.requests.supersede();
        self.store.begin_approval(ticket.stream);
        info!(session_id = %session_id, stream = %ticket.stream, approved, "Sending approval decision");

        let api = self.api.clone();
        let target = session_id.clone();
        Some(self.spawn(ticket, session_id, async move {
            api.approve(&target, approved).await
        }))
    }

    /// Stops the in-flight request, keeping whatever it already produced.
    ///
    /// Returns `true` if a request was running.
    pub fn cancel(&mut self) -> bool {
        match self.requests.cancel() {
            Some(stream) => self.store.cancel(stream),
            None => false,
        }
    }

    /// Cancels any request, forgets the session and empties the conversation.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the persisted id cannot be removed.
    pub async fn clear(&mut self) -> ChatResult<()> {
        self.requests.dispose();
        self.store.reset();
        self.sessions.clear().await
    }

    fn spawn<F>(&self, ticket: RequestTicket, session_id: String, request: F) -> StreamHandle
    where
        F: Future<Output = ChatResult<reqwest::Response>> + Send + 'static,
    {
        let stream = ticket.stream;
        let context = SessionContext {
            session_id,
            stale: self.sessions.stale_marker(),
        };
        let task = tokio::spawn(controller::drive(
            self.store.clone(),
            ticket,
            context,
            request,
        ));
        StreamHandle::new(stream, task)
    }
}

/// Runs the terminal front end.
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;
    let mut chat = ChatSession::from_config(&config);

    let restored = match config.resume_mode {
        ResumeMode::Fresh => {
            chat.clear().await.context("Failed to discard persisted session")?;
            false
        }
        ResumeMode::Persisted => chat
            .rehydrate()
            .await
            .context("Failed to restore persisted session")?,
    };

    if config.print_mode {
        let Some(prompt) = config.initial_prompt else {
            bail!("--print requires a prompt");
        };
        return print_once(&mut chat, &prompt).await;
    }

    interactive(&mut chat, restored, config.initial_prompt).await
}

/// Sends one prompt, prints the reply and returns once the stream ends.
async fn print_once(chat: &mut ChatSession, prompt: &str) -> Result<()> {
    let mut renderer = Renderer::new();
    renderer.skip_existing(&chat.snapshot());
    let mut rx = chat.subscribe();
    let mut stdout = std::io::stdout();

    let handle = chat.send_message(prompt).await?;
    let wait = handle.wait();
    tokio::pin!(wait);

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            changed = rx.changed() => {
                if changed.is_err() {
                    break StreamOutcome::Failed;
                }
                let state = rx.borrow_and_update().clone();
                write!(stdout, "{}", renderer.render(&state))?;
                stdout.flush()?;
            }
        }
    };

    write!(stdout, "{}", renderer.render(&chat.snapshot()))?;
    stdout.flush()?;
    info!(%outcome, "Request finished");

    match outcome {
        StreamOutcome::Failed => bail!("request failed"),
        StreamOutcome::Completed | StreamOutcome::AwaitingApproval | StreamOutcome::Cancelled => {
            Ok(())
        }
    }
}

/// Line-mode loop: reads commands from stdin and renders state changes.
async fn interactive(
    chat: &mut ChatSession,
    restored: bool,
    initial_prompt: Option<String>,
) -> Result<()> {
    let mut renderer = Renderer::new();
    let mut rx = chat.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    if restored {
        println!(
            "Restored session {}.",
            chat.session_id().unwrap_or("(unknown)")
        );
    }
    println!("Type /help for commands.");
    write!(stdout, "{}", renderer.render(&rx.borrow_and_update().clone()))?;
    stdout.flush()?;

    if let Some(prompt) = initial_prompt {
        submit(chat, &prompt).await;
    }

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                write!(stdout, "{}", renderer.render(&state))?;
                stdout.flush()?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Message(text) => submit(chat, &text).await,
                    Input::Command(Command::Quit) => break,
                    Input::Command(command) => handle_command(chat, command).await,
                    Input::Unknown(name) => println!("Unknown command: /{name}. Type /help."),
                    Input::Invalid(message) => println!("{message}"),
                }
            }
        }
    }

    chat.cancel();
    Ok(())
}

async fn submit(chat: &mut ChatSession, text: &str) {
    if let Err(e) = chat.send_message(text).await {
        warn!(error = %e, "Message not sent");
        match e {
            ChatError::ApprovalPending => {
                println!("The agent is waiting for a decision. Use /approve or /deny.");
            }
            other => println!("Could not send message: {}", other.user_message()),
        }
    }
}

async fn handle_command(chat: &mut ChatSession, command: Command) {
    match command {
        Command::Approve | Command::Deny => {
            if chat.status() != ConversationStatus::AwaitingApproval {
                println!("Nothing is waiting for approval.");
                return;
            }
            if chat.approve(command == Command::Approve).is_none() {
                println!("No active session.");
            }
        }
        Command::Cancel => {
            if !chat.cancel() {
                println!("Nothing to cancel.");
            }
        }
        Command::New => match chat.clear().await {
            Ok(()) => println!("Started a new conversation."),
            Err(e) => println!("Could not clear session: {}", e.user_message()),
        },
        Command::Status => {
            println!("{}", status_line(&chat.snapshot(), chat.session_id()));
        }
        Command::Help => println!("{}", help_text()),
        Command::Quit => {}
    }
}
