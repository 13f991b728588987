//! File-backed host shim used by the `vhelas` binary.
//!
//! Chats are read either as a JSON array of messages or as the host's
//! JSON-lines format, where the first line is a metadata header followed by
//! one message per line. The header is preserved on save.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::chat::ChatMessage;
use crate::scan::Persistence;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to access chat file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid chat JSON in '{path}' (line {line}): {source}")]
    Json {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk layout of a chat file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFormat {
    /// A single JSON array of messages.
    JsonArray,
    /// Header line plus one message per line.
    JsonLines,
}

impl ChatFormat {
    /// `.jsonl` files are JSON-lines, everything else a JSON array.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") => Self::JsonLines,
            _ => Self::JsonArray,
        }
    }
}

/// A chat loaded from disk.
#[derive(Debug, Clone)]
pub struct ChatFile {
    pub path: PathBuf,
    pub format: ChatFormat,
    /// Metadata line of a JSON-lines chat.
    pub header: Option<Value>,
    pub messages: Vec<ChatMessage>,
}

impl ChatFile {
    /// Parse chat contents according to the format implied by `path`.
    pub fn parse(path: impl Into<PathBuf>, contents: &str) -> Result<Self, HostError> {
        let path = path.into();
        let format = ChatFormat::for_path(&path);
        let json_err = |line: usize, source| HostError::Json {
            path: path.display().to_string(),
            line,
            source,
        };

        let (header, messages) = match format {
            ChatFormat::JsonArray => {
                let messages = serde_json::from_str(contents).map_err(|e| json_err(1, e))?;
                (None, messages)
            }
            ChatFormat::JsonLines => {
                let mut header = None;
                let mut messages = Vec::new();
                for (index, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let value: Value =
                        serde_json::from_str(line).map_err(|e| json_err(index + 1, e))?;
                    if index == 0 && value.get("mes").is_none() {
                        header = Some(value);
                        continue;
                    }
                    messages
                        .push(serde_json::from_value(value).map_err(|e| json_err(index + 1, e))?);
                }
                (header, messages)
            }
        };
        debug!(path = %path.display(), messages = messages.len(), "parsed chat");
        Ok(Self {
            path,
            format,
            header,
            messages,
        })
    }

    /// Serialize back to the file's format.
    pub fn render(&self) -> Result<String, HostError> {
        let json_err = |source| HostError::Json {
            path: self.path.display().to_string(),
            line: 0,
            source,
        };
        match self.format {
            ChatFormat::JsonArray => {
                let mut out = serde_json::to_string_pretty(&self.messages).map_err(json_err)?;
                out.push('\n');
                Ok(out)
            }
            ChatFormat::JsonLines => {
                let mut out = String::new();
                if let Some(header) = &self.header {
                    out.push_str(&serde_json::to_string(header).map_err(json_err)?);
                    out.push('\n');
                }
                for msg in &self.messages {
                    out.push_str(&serde_json::to_string(msg).map_err(json_err)?);
                    out.push('\n');
                }
                Ok(out)
            }
        }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| HostError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::parse(path, &contents)
    }

    pub async fn save(&self) -> Result<(), HostError> {
        let contents = self.render()?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|source| HostError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        info!(path = %self.path.display(), "chat saved");
        Ok(())
    }

    /// Save when `flag` holds a pending request. Returns whether it saved.
    pub async fn flush(&self, flag: &SaveFlag) -> Result<bool, HostError> {
        if !flag.take() {
            return Ok(false);
        }
        self.save().await?;
        Ok(true)
    }
}

/// Persistence that only records that a save is due.
///
/// Any number of requests between two [`take`](Self::take) calls collapse
/// into one save.
#[derive(Debug, Default)]
pub struct SaveFlag(AtomicBool);

impl SaveFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag, returning whether a save was pending.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl Persistence for SaveFlag {
    fn request_save(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
