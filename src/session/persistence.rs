//! Durable storage for the current session id.
//!
//! The id is kept in a single small JSON file. Writes go through a temp file
//! and a rename, and the file carries a checksum so a corrupted or hand-edited
//! file is treated as "no session" instead of being sent to the server.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};

/// Static key mixed into the session file checksum.
const INTEGRITY_KEY: &[u8] = b"pricewise-session-integrity-v1";

/// Writes data to a file atomically using write-to-temp-then-rename pattern.
async fn atomic_write(path: &Path, contents: &str) -> ChatResult<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ChatError::storage(parent, format!("failed to create directory: {e}")))?;
    }

    let temp_name = format!(
        ".{}.tmp.{}",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("session"),
        Uuid::new_v4()
    );
    let temp_path = parent.join(temp_name);

    fs::write(&temp_path, contents)
        .await
        .map_err(|e| ChatError::storage(&temp_path, format!("failed to write temp file: {e}")))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| ChatError::storage(path, format!("failed to rename temp file: {e}")))?;

    Ok(())
}

/// On-disk shape of the session file.
#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    session_id: String,
    /// SHA-256 over the integrity key and the id (hex-encoded).
    checksum: String,
}

impl SessionFile {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            checksum: compute_checksum(session_id),
        }
    }

    fn verify(self) -> ChatResult<String> {
        if self.checksum != compute_checksum(&self.session_id) {
            error!(
                session_id = %self.session_id,
                "Session file integrity check failed"
            );
            return Err(ChatError::invalid_session_id("checksum mismatch"));
        }
        validate_session_id(&self.session_id)?;
        Ok(self.session_id)
    }
}

/// Computes the checksum stored next to a session id.
fn compute_checksum(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(INTEGRITY_KEY);
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Validates a session id before it is persisted.
///
/// Ids are opaque to the client; anything non-empty without control
/// characters is accepted. Ids are percent-encoded when placed in a URL path.
///
/// # Errors
///
/// Returns [`ChatError::InvalidSessionId`] if the id is empty or contains a
/// control character.
pub fn validate_session_id(session_id: &str) -> ChatResult<()> {
    if session_id.is_empty() {
        warn!("Session validation failed: empty session ID");
        return Err(ChatError::invalid_session_id("session ID cannot be empty"));
    }

    if session_id.chars().any(char::is_control) {
        warn!(
            session_id = %session_id.escape_debug(),
            "Session validation failed: control characters"
        );
        return Err(ChatError::invalid_session_id(
            "must not contain control characters",
        ));
    }

    Ok(())
}

/// File-backed storage for the single persisted session id.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    path: PathBuf,
}

impl SessionStorage {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns the file backing this storage.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted session id.
    ///
    /// Returns `Ok(None)` when no id is stored. A corrupt or tampered file is
    /// removed and also reported as `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Storage`] if the file exists but cannot be read.
    pub async fn load(&self) -> ChatResult<Option<String>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ChatError::storage(&self.path, format!("failed to read: {e}"))),
        };

        let verified = serde_json::from_str::<SessionFile>(&contents)
            .map_err(ChatError::from)
            .and_then(SessionFile::verify);

        match verified {
            Ok(session_id) => Ok(Some(session_id)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable session file");
                self.erase().await?;
                Ok(None)
            }
        }
    }

    /// Persists `session_id`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidSessionId`] for ids that fail validation
    /// and [`ChatError::Storage`] if the write fails.
    pub async fn save(&self, session_id: &str) -> ChatResult<()> {
        validate_session_id(session_id)?;
        let json = serde_json::to_string_pretty(&SessionFile::new(session_id))?;
        atomic_write(&self.path, &json).await
    }

    /// Removes the persisted id. Removing a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Storage`] if the file exists but cannot be removed.
    pub async fn erase(&self) -> ChatResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChatError::storage(&self.path, format!("failed to remove: {e}"))),
        }
    }
}
