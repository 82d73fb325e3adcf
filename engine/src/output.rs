//! JSON Lines result sink
//!
//! One file per strategy under the task output directory, named
//! `{strategy}_{shot}_{timestamp}.jsonl`. Results are buffered and written
//! every [`FLUSH_EVERY`] results per strategy and once more at the end.

use crate::prompts::ShotMode;
use sdk::errors::EngineError;
use sdk::sink::ResultSink;
use sdk::types::{LabelResult, StrategyKind};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Buffered results per strategy before a write
pub const FLUSH_EVERY: usize = 10;

struct StrategyFile {
    path: PathBuf,
    pending: Vec<LabelResult>,
}

pub struct JsonlResultSink {
    dir: PathBuf,
    shot_mode: ShotMode,
    timestamp: String,
    files: BTreeMap<StrategyKind, StrategyFile>,
}

impl JsonlResultSink {
    /// Create the sink, making `dir` if needed
    pub fn create(dir: &Path, shot_mode: ShotMode) -> Result<Self, EngineError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            EngineError::ResultSink(format!("cannot create {}: {}", dir.display(), e))
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            shot_mode,
            timestamp: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
            files: BTreeMap::new(),
        })
    }

    /// Output file of `strategy` (created on the first write)
    pub fn path_for(&self, strategy: StrategyKind) -> PathBuf {
        self.dir.join(format!(
            "{}_{}_{}.jsonl",
            strategy.as_str(),
            self.shot_mode,
            self.timestamp
        ))
    }

    /// Files written so far
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.values().map(|f| f.path.clone()).collect()
    }

    fn write_pending(file: &mut StrategyFile) -> Result<(), EngineError> {
        if file.pending.is_empty() {
            return Ok(());
        }

        let handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file.path)
            .map_err(|e| {
                EngineError::ResultSink(format!("cannot open {}: {}", file.path.display(), e))
            })?;
        let mut writer = BufWriter::new(handle);

        // Results stay buffered until the write went through
        for result in &file.pending {
            serde_json::to_writer(&mut writer, result)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        file.pending.clear();

        tracing::debug!("Wrote results to {}", file.path.display());
        Ok(())
    }
}

impl ResultSink for JsonlResultSink {
    fn append(&mut self, strategy: StrategyKind, result: LabelResult) -> Result<(), EngineError> {
        let path = self.path_for(strategy);
        let file = self.files.entry(strategy).or_insert_with(|| StrategyFile {
            path,
            pending: Vec::new(),
        });

        file.pending.push(result);
        if file.pending.len() >= FLUSH_EVERY {
            Self::write_pending(file)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        for file in self.files.values_mut() {
            Self::write_pending(file)?;
        }
        Ok(())
    }
}

impl Drop for JsonlResultSink {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!("Results not flushed on drop: {}", e);
        }
    }
}
