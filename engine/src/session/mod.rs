//! Session Store
//!
//! Durable, hierarchically keyed storage for conversation transcripts. Each
//! key maps to one JSON document holding an ordered message sequence.
//!
//! Ordinary session writes take no lock: a handle is owned by exactly one
//! task, and parallel tasks never share a key. The only shared state is the
//! optional [`index::SessionIndex`], which has its own single-writer queue.
//!
//! # Layout
//!
//! ```text
//! {root}/{task}/{ordinal:04}_{short_title}/{strategy}.json   parallel sessions
//! {root}/{task}/{strategy}.json                               serial sessions
//! {root}/index.json                                           optional index
//! ```

pub mod index;
pub mod key;

pub use index::{IndexEntry, IndexHandle, SessionIndex};
pub use key::SessionKey;

use crate::llm::Message;
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// How `open` treats an existing transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Start empty; an existing transcript is a conflict unless overwriting
    Fresh,

    /// Load the existing transcript, or start empty when there is none
    Continue,
}

/// On-disk transcript document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    pub session_id: Uuid,
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl SessionDocument {
    fn new(key: &SessionKey) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            key: key.to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }
}

/// Estimated tokens for a message sequence
///
/// One token per character. Mixed CJK/English text tokenizes far denser
/// than English alone, so this errs on the side of rotating early.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| m.content.chars().count()).sum()
}

/// Write `bytes` to a sibling temp file, then rename over `path`
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Factory for session handles rooted at one directory
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
    index: Option<IndexHandle>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: None,
        }
    }

    /// Record every closed session in the shared index
    pub fn with_index(mut self, index: IndexHandle) -> Self {
        self.index = Some(index);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the index file under this root
    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    /// Absolute location of the document for `key`
    pub fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    pub async fn exists(&self, key: &SessionKey) -> bool {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false)
    }

    /// Open the session for `key`
    ///
    /// # Errors
    ///
    /// - `SessionConflict` when `mode` is `Fresh`, the transcript exists, and
    ///   `overwrite` is false
    /// - `SessionStore` / `Io` / `Serialization` when the document cannot be
    ///   read or created
    pub async fn open(
        &self,
        key: SessionKey,
        mode: SessionMode,
        overwrite: bool,
    ) -> Result<SessionHandle, EngineError> {
        let path = self.path_for(&key);
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);

        let document = match (mode, exists) {
            (SessionMode::Continue, true) => {
                let document = read_document(&path).await?;
                tracing::debug!(
                    "Continuing session {} ({} messages)",
                    key,
                    document.messages.len()
                );
                document
            }
            (SessionMode::Fresh, true) if !overwrite => {
                return Err(EngineError::SessionConflict(key.to_string()));
            }
            _ => {
                let document = SessionDocument::new(&key);
                let json = serde_json::to_vec_pretty(&document)?;
                write_atomic(&path, &json).await?;
                tracing::debug!("Opened new session {}", key);
                document
            }
        };

        Ok(SessionHandle {
            key,
            path,
            document,
            closed: false,
            index: self.index.clone(),
        })
    }

    /// Read a transcript by its printed key
    pub async fn load(&self, key: &str) -> Result<SessionDocument, EngineError> {
        let key = SessionKey::parse(key)?;
        let path = self.path_for(&key);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(EngineError::SessionStore(format!("no session '{}'", key)));
        }
        read_document(&path).await
    }

    /// Remove a transcript by its printed key
    pub async fn delete(&self, key: &str) -> Result<(), EngineError> {
        let key = SessionKey::parse(key)?;
        let path = self.path_for(&key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Deleted session {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::SessionStore(format!("no session '{}'", key)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_document(path: &Path) -> Result<SessionDocument, EngineError> {
    let contents = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&contents).map_err(|e| {
        EngineError::SessionStore(format!("corrupt transcript {}: {}", path.display(), e))
    })
}

/// Exclusive handle on one open transcript
///
/// Not `Clone`: the owning task is the only writer.
#[derive(Debug)]
pub struct SessionHandle {
    key: SessionKey,
    path: PathBuf,
    document: SessionDocument,
    closed: bool,
    index: Option<IndexHandle>,
}

impl SessionHandle {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> Uuid {
        self.document.session_id
    }

    /// Messages in append order
    pub fn messages(&self) -> &[Message] {
        &self.document.messages
    }

    pub fn len(&self) -> usize {
        self.document.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.messages.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Append a message and persist the transcript before returning
    ///
    /// Appends never deduplicate: the same message appended twice is stored
    /// twice.
    pub async fn append(&mut self, message: Message) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::SessionStore(format!(
                "session {} is closed",
                self.key
            )));
        }

        self.document.messages.push(message);
        self.document.updated_at = Utc::now();

        if let Err(e) = self.persist().await {
            // Keep memory and disk in step
            self.document.messages.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Flush and release the handle; calling it again is a no-op
    pub async fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }

        self.persist().await?;
        self.closed = true;

        if let Some(index) = &self.index {
            index
                .record(IndexEntry {
                    key: self.key.to_string(),
                    location: self.path.clone(),
                    title: self
                        .key
                        .slot()
                        .unwrap_or_else(|| self.key.name())
                        .to_string(),
                    message_count: self.document.messages.len(),
                    updated_at: self.document.updated_at,
                })
                .await;
        }

        tracing::debug!(
            "Closed session {} ({} messages)",
            self.key,
            self.document.messages.len()
        );
        Ok(())
    }

    /// Estimated tokens held by the transcript
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.document.messages)
    }

    /// True once the transcript reaches `threshold` of `limit` tokens
    pub fn is_context_full(&self, limit: usize, threshold: f64) -> bool {
        self.estimated_tokens() as f64 >= limit as f64 * threshold
    }

    async fn persist(&self) -> Result<(), EngineError> {
        let json = serde_json::to_vec_pretty(&self.document)?;
        write_atomic(&self.path, &json).await
    }
}
