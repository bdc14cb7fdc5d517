//! Plain-text projection of the conversation for a line-mode terminal.
//!
//! The [`Renderer`] remembers how much of every message it has already
//! written, so each call to [`Renderer::render`] returns only what is new
//! since the last call: the unseen suffix of streamed content, newly
//! requested tool calls, newly resolved tool results, a receipt, an approval
//! prompt, or an error notice.
//!
//! It only ever reads [`ConversationState`].

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use super::state::ConversationState;
use crate::types::{Message, MessageId, Receipt, Role};
use crate::util::truncate_string;

const MAX_ARGS_LEN: usize = 80;
const MAX_RESULT_LEN: usize = 160;

#[derive(Debug, Default, Clone)]
struct Progress {
    header: bool,
    content: usize,
    tool_calls: usize,
    results: Vec<bool>,
    receipt: bool,
    approval: bool,
    closed: bool,
}

impl Progress {
    fn complete(message: &Message) -> Self {
        Self {
            header: !message.content.is_empty(),
            content: message.content.len(),
            tool_calls: message.tool_calls.len(),
            results: message.tool_calls.iter().map(|c| c.is_resolved()).collect(),
            receipt: message.receipt.is_some(),
            approval: message.is_approval_required,
            closed: !message.is_streaming,
        }
    }
}

/// Accumulates output and tracks whether the cursor sits mid-line.
struct Output {
    text: String,
    line_open: bool,
}

impl Output {
    fn push(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        self.text.push_str(s);
        self.line_open = !s.ends_with('\n');
    }

    fn ensure_newline(&mut self) {
        if self.line_open {
            self.push("\n");
        }
    }

    fn line(&mut self, s: &str) {
        self.ensure_newline();
        self.push(s);
        self.push("\n");
    }
}

/// Incremental renderer for conversation state.
#[derive(Debug, Default)]
pub struct Renderer {
    seen: HashMap<MessageId, Progress>,
    line_open: bool,
    error_shown: bool,
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks everything currently in `state` as already shown.
    pub fn skip_existing(&mut self, state: &ConversationState) {
        for message in state.messages() {
            self.seen.insert(message.id, Progress::complete(message));
        }
        self.error_shown = state.last_error().is_some();
    }

    /// Returns the text that has appeared since the previous call.
    pub fn render(&mut self, state: &ConversationState) -> String {
        let live: HashSet<MessageId> = state.messages().iter().map(|m| m.id).collect();
        self.seen.retain(|id, _| live.contains(id));

        let mut out = Output {
            text: String::new(),
            line_open: self.line_open,
        };

        for message in state.messages() {
            let progress = self.seen.entry(message.id).or_default();
            match message.role {
                Role::User => render_user(&mut out, progress, message),
                Role::Assistant => render_assistant(&mut out, progress, message),
            }
        }

        match state.last_error() {
            Some(error) if !self.error_shown => {
                let synthesized = format!("Error: {error}");
                let already_visible = state
                    .messages()
                    .iter()
                    .rev()
                    .find(|m| m.is_assistant())
                    .is_some_and(|m| m.content == synthesized);
                if !already_visible {
                    out.line(&format!("  [error] {error}"));
                }
                self.error_shown = true;
            }
            Some(_) => {}
            None => self.error_shown = false,
        }

        self.line_open = out.line_open;
        out.text
    }
}

fn render_user(out: &mut Output, progress: &mut Progress, message: &Message) {
    if progress.closed {
        return;
    }
    out.line(&format!("you: {}", message.content));
    progress.content = message.content.len();
    progress.closed = true;
}

fn render_assistant(out: &mut Output, progress: &mut Progress, message: &Message) {
    for call in message.tool_calls.iter().skip(progress.tool_calls) {
        out.line(&format!("  -> {}", format_call(&call.name, &call.args)));
    }
    progress.tool_calls = message.tool_calls.len();

    progress.results.resize(message.tool_calls.len(), false);
    for (call, shown) in message.tool_calls.iter().zip(progress.results.iter_mut()) {
        if let (Some(result), false) = (&call.result, *shown) {
            out.line(&format!(
                "  <- {}: {}",
                call.name,
                truncate_string(result.trim(), MAX_RESULT_LEN)
            ));
            *shown = true;
        }
    }

    if let Some(suffix) = message.content.get(progress.content..) {
        if !suffix.is_empty() {
            if !progress.header {
                out.ensure_newline();
                out.push("agent: ");
                progress.header = true;
            }
            out.push(suffix);
            progress.content = message.content.len();
        }
    }

    if let (Some(receipt), false) = (&message.receipt, progress.receipt) {
        out.ensure_newline();
        out.push(&format_receipt(receipt));
        progress.receipt = true;
    }

    if message.is_approval_required && !progress.approval {
        let names: Vec<&str> = message.tool_calls.iter().map(|c| c.name.as_str()).collect();
        out.line(&format!(
            "  Approval required for: {}. Use /approve or /deny.",
            if names.is_empty() { "(unspecified)".to_string() } else { names.join(", ") }
        ));
        progress.approval = true;
    }

    if !message.is_streaming && !progress.closed {
        if progress.header {
            out.ensure_newline();
        }
        progress.closed = true;
    }
}

fn format_call(name: &str, args: &Map<String, Value>) -> String {
    if args.is_empty() {
        return name.to_string();
    }
    let args = Value::Object(args.clone()).to_string();
    format!("{name} {}", truncate_string(&args, MAX_ARGS_LEN))
}

/// Formats a receipt as an indented block ending in a newline.
#[must_use]
pub fn format_receipt(receipt: &Receipt) -> String {
    let mut block = format!(
        "  Receipt: {}\n    Price: {:.2} {}\n",
        receipt.product_name, receipt.price, receipt.currency
    );
    if let Some(rating) = receipt.average_rating {
        block.push_str(&format!("    Rating: {rating:.1}/5\n"));
    }
    if let Some(range) = &receipt.price_range {
        block.push_str(&format!("    Price range: {range}\n"));
    }
    if let Some(reason) = &receipt.recommendation_reason {
        block.push_str(&format!("    Why: {reason}\n"));
    }
    block
}

/// One-line summary for `/status`.
#[must_use]
pub fn status_line(state: &ConversationState, session_id: Option<&str>) -> String {
    let mut line = format!(
        "status: {} | session: {} | messages: {}",
        state.status(),
        session_id.unwrap_or("none"),
        state.messages().len()
    );
    if let Some(error) = state.last_error() {
        line.push_str(&format!(" | last error: {error}"));
    }
    line
}
