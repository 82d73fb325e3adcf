//! Session index
//!
//! Optional debug aid mapping session keys to transcript locations. The
//! index file is shared by every task of a run, so all writes go through a
//! single background writer fed by a bounded channel. Nothing on the hot
//! path ever touches the file directly.

use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Channel buffer size for the writer queue
const CHANNEL_BUFFER_SIZE: usize = 256;

/// One index row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    pub location: PathBuf,
    pub title: String,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
enum IndexCommand {
    Record(IndexEntry),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable sender side of the index queue
#[derive(Debug, Clone)]
pub struct IndexHandle {
    tx: mpsc::Sender<IndexCommand>,
}

impl IndexHandle {
    /// Queue an entry; a failure is logged and otherwise ignored
    pub async fn record(&self, entry: IndexEntry) {
        let key = entry.key.clone();
        if self
            .tx
            .send(IndexCommand::Record(entry))
            .await
            .is_err()
        {
            let err = EngineError::IndexWrite(format!("index writer stopped, dropped {}", key));
            tracing::warn!("{}", err);
        }
    }

    /// Wait until every entry queued so far has been written
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(IndexCommand::Flush(ack_tx))
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
    }
}

/// The writer task and its file
pub struct SessionIndex {
    handle: IndexHandle,
    writer: JoinHandle<()>,
}

impl SessionIndex {
    /// Start the background writer for the index file at `path`
    ///
    /// Existing entries are loaded first so repeated runs accumulate.
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let writer = tokio::spawn(run_writer(path, rx));

        Self {
            handle: IndexHandle { tx },
            writer,
        }
    }

    pub fn handle(&self) -> IndexHandle {
        self.handle.clone()
    }

    /// Write outstanding entries and stop the writer
    ///
    /// Entries recorded through surviving handles afterwards are dropped with
    /// a warning.
    pub async fn shutdown(self) {
        let _ = self.handle.tx.send(IndexCommand::Shutdown).await;
        if let Err(e) = self.writer.await {
            tracing::warn!("Index writer ended abnormally: {}", e);
        }
    }

    /// Read the index file, newest first
    pub async fn read(path: &Path) -> Result<Vec<IndexEntry>, EngineError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let contents = tokio::fs::read_to_string(path).await?;
        let mut entries: Vec<IndexEntry> = serde_json::from_str(&contents)?;
        sort_newest_first(&mut entries);
        Ok(entries)
    }

    /// Drop `key` from the index at `path`; returns whether it was listed
    ///
    /// Meant for use when no writer is running on the same file.
    pub async fn remove(path: &Path, key: &str) -> Result<bool, EngineError> {
        let entries = Self::read(path).await?;
        let before = entries.len();
        let kept: BTreeMap<String, IndexEntry> = entries
            .into_iter()
            .filter(|e| e.key != key)
            .map(|e| (e.key.clone(), e))
            .collect();

        if kept.len() == before {
            return Ok(false);
        }
        write_index(path, &kept).await?;
        Ok(true)
    }
}

fn sort_newest_first(entries: &mut [IndexEntry]) {
    entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.key.cmp(&b.key)));
}

async fn run_writer(path: PathBuf, mut rx: mpsc::Receiver<IndexCommand>) {
    let mut entries: BTreeMap<String, IndexEntry> = match SessionIndex::read(&path).await {
        Ok(existing) => existing.into_iter().map(|e| (e.key.clone(), e)).collect(),
        Err(e) => {
            tracing::warn!("Starting a new session index, could not read the old one: {}", e);
            BTreeMap::new()
        }
    };

    while let Some(command) = rx.recv().await {
        match command {
            IndexCommand::Record(entry) => {
                entries.insert(entry.key.clone(), entry);
                if let Err(e) = write_index(&path, &entries).await {
                    let err = EngineError::IndexWrite(e.to_string());
                    tracing::warn!("{}", err);
                }
            }
            IndexCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            IndexCommand::Shutdown => break,
        }
    }

    tracing::debug!("Session index writer stopped ({} entries)", entries.len());
}

async fn write_index(
    path: &Path,
    entries: &BTreeMap<String, IndexEntry>,
) -> Result<(), EngineError> {
    let mut rows: Vec<IndexEntry> = entries.values().cloned().collect();
    sort_newest_first(&mut rows);

    let json = serde_json::to_string_pretty(&rows)?;
    super::write_atomic(path, json.as_bytes()).await
}
