//! Utility functions and helpers

use directories::ProjectDirs;
use std::path::PathBuf;

/// File name of the persisted session inside the data directory.
pub const STATE_FILE_NAME: &str = "session.json";

pub fn get_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "pricewise", "pricewise").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Default location of the persisted session file.
///
/// Falls back to a `.pricewise` directory under the current directory when the
/// platform has no data directory (e.g. no home directory is set).
#[must_use]
pub fn default_state_file() -> PathBuf {
    get_data_dir()
        .unwrap_or_else(|| PathBuf::from(".pricewise"))
        .join(STATE_FILE_NAME)
}

/// Truncates `s` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
