//! On-disk storage for chat transcripts
//!
//! All transcripts live as markdown files in one flat directory. Writes
//! overwrite the whole file in place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info};

use super::identity::SessionEmoji;
use super::session::ChatSession;
use super::transcript::{self, TRANSCRIPT_EXTENSION};

/// Directory used when none is configured
pub const DEFAULT_HISTORY_DIR: &str = "chat_history";

/// Error type for transcript storage
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid transcript name {0:?}")]
    InvalidName(String),
}

/// A saved transcript, as shown in a session list
#[derive(Debug, Clone)]
pub struct SavedChat {
    pub file_name: String,
    pub emoji: Option<SessionEmoji>,
    pub title: String,
    pub modified: Option<DateTime<Local>>,
}

/// Transcript storage manager
#[derive(Debug, Clone)]
pub struct ChatStore {
    /// Directory holding every transcript
    base_dir: PathBuf,
}

impl ChatStore {
    /// Open a store, creating the directory if needed
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Write the session to its transcript file
    ///
    /// An empty session is not written. Otherwise the file name is assigned
    /// on first save (from the first message) and kept for the rest of the
    /// session. Returns the path written, if any.
    pub fn persist(&self, session: &mut ChatSession) -> Result<Option<PathBuf>, StoreError> {
        let Some(name) = session.ensure_backing_file() else {
            return Ok(None);
        };
        let path = self.base_dir.join(&name);
        let contents = transcript::render(session.emoji(), session.messages());
        std::fs::write(&path, contents)?;
        debug!(path = %path.display(), messages = session.messages().len(), "transcript saved");
        Ok(Some(path))
    }

    /// Replace the session's messages with a saved transcript
    ///
    /// The session keeps its emoji; its backing file becomes `file_name`, so
    /// later turns are appended to the same transcript.
    pub fn load(&self, session: &mut ChatSession, file_name: &str) -> Result<(), StoreError> {
        let path = self.path_for(file_name)?;
        let contents = std::fs::read_to_string(&path)?;
        let messages = transcript::parse(&contents);
        info!(file = file_name, messages = messages.len(), "transcript loaded");
        session.restore(messages, file_name.to_string());
        Ok(())
    }

    /// Delete a transcript; deleting a missing file is not an error
    pub fn delete(&self, file_name: &str) -> Result<(), StoreError> {
        let path = self.path_for(file_name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(file = file_name, "transcript deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every file in the storage directory
    ///
    /// Returns how many files were removed.
    pub fn delete_all(&self) -> Result<usize, StoreError> {
        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(removed, dir = %self.base_dir.display(), "all transcripts deleted");
        Ok(removed)
    }

    /// List saved transcripts, newest first
    pub fn list(&self) -> Result<Vec<SavedChat>, StoreError> {
        let mut chats = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_transcript = path
                .extension()
                .map(|e| e == TRANSCRIPT_EXTENSION)
                .unwrap_or(false);
            if !is_transcript || !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let (emoji, title) = transcript::split_file_name(file_name);
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Local>::from);
            chats.push(SavedChat {
                file_name: file_name.to_string(),
                emoji,
                title,
                modified,
            });
        }

        chats.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(chats)
    }

    /// Resolve a transcript name inside the storage directory
    ///
    /// Only bare file names are accepted.
    fn path_for(&self, file_name: &str) -> Result<PathBuf, StoreError> {
        let is_bare = !file_name.is_empty()
            && file_name != "."
            && file_name != ".."
            && !file_name.contains(&['/', '\\'][..])
            && Path::new(file_name).file_name().and_then(|n| n.to_str()) == Some(file_name);
        if !is_bare {
            return Err(StoreError::InvalidName(file_name.to_string()));
        }
        Ok(self.base_dir.join(file_name))
    }
}
