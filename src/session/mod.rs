//! Session ownership for Pricewise.
//!
//! A session is an opaque id issued by the remote service. At most one is
//! active at a time. The [`SessionStore`] creates it lazily, persists it so a
//! restart can pick up the same conversation, validates it against the remote
//! service on startup, and forgets it when the user resets or the remote
//! service no longer recognizes it.
//!
//! # Example
//!
//! ```no_run
//! use pricewise::api::ApiClient;
//! use pricewise::session::{SessionStorage, SessionStore};
//! use std::path::PathBuf;
//!
//! # async fn example() -> pricewise::error::ChatResult<()> {
//! let api = ApiClient::new("http://localhost:8000/chat");
//! let mut sessions = SessionStore::new(SessionStorage::new(PathBuf::from("session.json")));
//!
//! if sessions.rehydrate(&api).await?.is_none() {
//!     let id = sessions.create(&api).await?;
//!     println!("started session {id}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod persistence;

use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use crate::api::{ApiClient, History};
use crate::error::ChatResult;

pub use persistence::{validate_session_id, SessionStorage};

/// Shared marker for a session the remote reported unknown mid-stream.
///
/// Marking also erases the persisted copy if it still holds that id, so a
/// restart does not try to resume it.
#[derive(Debug, Clone)]
pub(crate) struct StaleMarker {
    marked: Arc<Mutex<Option<String>>>,
    storage: SessionStorage,
}

impl StaleMarker {
    pub(crate) fn new(storage: SessionStorage) -> Self {
        Self {
            marked: Arc::default(),
            storage,
        }
    }

    pub(crate) async fn mark(&self, session_id: &str) {
        *self.marked.lock().unwrap_or_else(PoisonError::into_inner) = Some(session_id.to_string());
        warn!(session_id = %session_id, "Remote no longer knows session");

        match self.storage.load().await {
            Ok(Some(persisted)) if persisted == session_id => {
                if let Err(e) = self.storage.erase().await {
                    warn!(session_id = %session_id, error = %e, "Failed to erase stale session");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to read session file"),
        }
    }

    fn is_marked(&self, session_id: &str) -> bool {
        self.marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(session_id)
    }

    fn reset(&self) {
        *self.marked.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Owns the current session id and its persisted copy.
#[derive(Debug)]
pub struct SessionStore {
    storage: SessionStorage,
    current: Option<String>,
    stale: StaleMarker,
}

impl SessionStore {
    #[must_use]
    pub fn new(storage: SessionStorage) -> Self {
        Self {
            stale: StaleMarker::new(storage.clone()),
            storage,
            current: None,
        }
    }

    /// Returns the active session id, if any.
    ///
    /// A session the remote has reported unknown is no longer active.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current
            .as_deref()
            .filter(|session_id| !self.stale.is_marked(session_id))
    }

    #[must_use]
    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Handle a stream uses to report that the remote forgot its session.
    pub(crate) fn stale_marker(&self) -> StaleMarker {
        self.stale.clone()
    }

    /// Returns `true` if the active session has been reported unknown.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.current
            .as_deref()
            .is_some_and(|session_id| self.stale.is_marked(session_id))
    }

    /// Creates a new session on the remote service and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::SessionCreation`](crate::error::ChatError) if the
    /// remote refuses, or a storage error if the id cannot be persisted.
    pub async fn create(&mut self, api: &ApiClient) -> ChatResult<String> {
        let session_id = api.create_session().await?;
        self.storage.save(&session_id).await?;
        self.stale.reset();
        self.current = Some(session_id.clone());
        info!(session_id = %session_id, "Created new session");
        Ok(session_id)
    }

    /// Returns the active session, creating one if there is none.
    ///
    /// A session previously reported unknown by the remote is discarded first.
    pub async fn ensure(&mut self, api: &ApiClient) -> ChatResult<String> {
        if self.is_stale() {
            warn!(session_id = ?self.current, "Discarding session the remote no longer knows");
            self.discard().await?;
        }
        match &self.current {
            Some(session_id) => Ok(session_id.clone()),
            None => self.create(api).await,
        }
    }

    /// Restores the persisted session, if the remote still recognizes it.
    ///
    /// Returns the session's history on success. When nothing is persisted,
    /// or the remote answers with a not-found or failure, the persisted id is
    /// discarded and `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// Only local storage failures are returned as errors.
    pub async fn rehydrate(&mut self, api: &ApiClient) -> ChatResult<Option<History>> {
        let Some(session_id) = self.storage.load().await? else {
            return Ok(None);
        };

        match api.fetch_history(&session_id).await {
            Ok(history) => {
                info!(
                    session_id = %session_id,
                    message_count = history.messages.len(),
                    "Rehydrated session"
                );
                self.stale.reset();
                self.current = Some(session_id);
                Ok(Some(history))
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Discarding persisted session");
                self.discard().await?;
                Ok(None)
            }
        }
    }

    /// Forgets the active session and erases its persisted copy.
    pub async fn clear(&mut self) -> ChatResult<()> {
        if let Some(session_id) = &self.current {
            info!(session_id = %session_id, "Clearing session");
        }
        self.discard().await
    }

    async fn discard(&mut self) -> ChatResult<()> {
        self.current = None;
        self.stale.reset();
        self.storage.erase().await
    }
}
