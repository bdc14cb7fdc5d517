//! Observable store for conversation state.
//!
//! The store owns the single [`ConversationState`] and notifies subscribers
//! after every mutation that changed something. It is backed by a
//! `tokio::sync::watch` channel, so subscribers always see the latest
//! snapshot and a slow subscriber never blocks the writer.

use std::sync::Arc;
use tokio::sync::watch;

use super::state::{ConversationState, ConversationStatus, StreamId};
use crate::api::History;
use crate::types::{MessageId, StreamEvent};

/// Cloneable handle to the conversation state.
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<ConversationState>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConversationState::new());
        Self { tx: Arc::new(tx) }
    }

    /// Returns a receiver that is notified on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.tx.subscribe()
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ConversationState {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> ConversationStatus {
        self.tx.borrow().status()
    }

    pub(crate) fn begin_turn(&self, stream: StreamId, content: String) -> MessageId {
        let mut id = MessageId(0);
        self.tx.send_modify(|state| id = state.begin_turn(stream, content));
        id
    }

    pub(crate) fn begin_approval(&self, stream: StreamId) -> MessageId {
        let mut id = MessageId(0);
        self.tx.send_modify(|state| id = state.begin_approval(stream));
        id
    }

    /// Applies one event; subscribers are only woken if something changed.
    pub(crate) fn apply(&self, stream: StreamId, event: StreamEvent) -> bool {
        self.tx.send_if_modified(|state| state.apply(stream, event))
    }

    pub(crate) fn cancel(&self, stream: StreamId) -> bool {
        self.tx.send_if_modified(|state| state.cancel(stream))
    }

    pub(crate) fn finish(&self, stream: StreamId) -> bool {
        self.tx.send_if_modified(|state| state.finish(stream))
    }

    pub(crate) fn restore(&self, history: History) -> usize {
        let mut added = 0;
        self.tx.send_if_modified(|state| {
            added = state.restore(history);
            added > 0
        });
        added
    }

    pub(crate) fn reset(&self) {
        self.tx.send_modify(ConversationState::reset);
    }
}
