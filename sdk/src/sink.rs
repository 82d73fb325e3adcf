//! Result sink seam
//!
//! Sinks receive completed label results keyed by strategy. Durable output is
//! the sink's business; the engine only appends and asks for a final flush.

use crate::errors::EngineError;
use crate::types::{LabelResult, StrategyKind};
use std::collections::BTreeMap;

/// Per-strategy accumulator for label results
pub trait ResultSink: Send {
    /// Accept one result for `strategy`
    fn append(&mut self, strategy: StrategyKind, result: LabelResult) -> Result<(), EngineError>;

    /// Push buffered results to durable storage
    fn flush(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Sink that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    results: BTreeMap<StrategyKind, Vec<LabelResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results collected for one strategy, in arrival order
    pub fn results(&self, strategy: StrategyKind) -> &[LabelResult] {
        self.results
            .get(&strategy)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Every collected result
    pub fn all(&self) -> impl Iterator<Item = &LabelResult> {
        self.results.values().flatten()
    }

    /// Total number of results across strategies
    pub fn len(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSink for MemorySink {
    fn append(&mut self, strategy: StrategyKind, result: LabelResult) -> Result<(), EngineError> {
        self.results.entry(strategy).or_default().push(result);
        Ok(())
    }
}
