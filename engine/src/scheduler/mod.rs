//! Hybrid Scheduler
//!
//! Drives one record at a time through two concurrency disciplines:
//!
//! - **Parallel group**: one task per strategy in a bounded worker pool
//!   (`min(|P|, cap)` permits). Each task opens its own fresh session keyed by
//!   (task, record, strategy), so tasks never share state.
//! - **Serial group**: runs on the scheduler's control flow, right after the
//!   parallel tasks are dispatched, on long-lived sessions owned by the
//!   [`SerialLane`].
//!
//! Per record: `Dispatched → Awaiting → Collected → Advanced`. The next record
//! is dispatched only after every result of the current one has reached the
//! sink, which keeps the serial sessions in input order and bounds in-flight
//! work to one record.

pub mod serial;

pub use serial::{MemoryBudget, SerialLane};

use crate::session::{SessionKey, SessionMode, SessionStore};
use crate::strategy::{run_strategy, StrategyContext};
use futures::FutureExt;
use sdk::errors::EngineError;
use sdk::sink::ResultSink;
use sdk::source::RecordSource;
use sdk::types::{
    ConcurrencyGroup, Failure, FailureKind, LabelFields, LabelResult, LabelStatus, Record,
    StrategyKind,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;

/// Progress notifications, in the order they happen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Parallel tasks for the record were submitted to the pool
    RecordDispatched {
        ordinal: usize,
        parallel: Vec<StrategyKind>,
    },

    /// One (record, strategy) task produced its result
    TaskFinished {
        ordinal: usize,
        strategy: StrategyKind,
        status: LabelStatus,
    },

    /// Every result of the record reached the sink
    RecordCollected { ordinal: usize },

    /// The scheduler moved past the record
    RecordAdvanced { ordinal: usize },
}

/// Run settings consumed at startup
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Task name, the top level of every session key
    pub task: String,

    /// Strategies to run, in the order results are routed
    pub strategies: Vec<StrategyKind>,

    /// Upper bound on concurrently running parallel tasks
    pub concurrency_cap: Option<usize>,

    /// Replace existing transcripts instead of failing with a conflict
    pub overwrite: bool,

    /// Context budget for serial sessions
    pub memory: MemoryBudget,
}

impl SchedulerOptions {
    pub fn new(task: impl Into<String>, strategies: Vec<StrategyKind>) -> Self {
        Self {
            task: task.into(),
            strategies,
            concurrency_cap: None,
            overwrite: false,
            memory: MemoryBudget::default(),
        }
    }
}

/// Outcome counts for one strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StrategyTally {
    pub completed: usize,
    pub defaulted: usize,
    pub failed: usize,
}

impl StrategyTally {
    pub fn total(&self) -> usize {
        self.completed + self.defaulted + self.failed
    }
}

/// Final state of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub task: String,
    pub records: usize,
    pub per_strategy: BTreeMap<StrategyKind, StrategyTally>,
}

impl RunSummary {
    fn new(task: &str, strategies: &[StrategyKind]) -> Self {
        Self {
            task: task.to_string(),
            records: 0,
            per_strategy: strategies
                .iter()
                .map(|&kind| (kind, StrategyTally::default()))
                .collect(),
        }
    }

    fn record(&mut self, result: &LabelResult) {
        let tally = self.per_strategy.entry(result.strategy).or_default();
        match result.status {
            LabelStatus::Completed => tally.completed += 1,
            LabelStatus::Defaulted => tally.defaulted += 1,
            LabelStatus::Failed => tally.failed += 1,
        }
    }

    pub fn tally(&self, strategy: StrategyKind) -> StrategyTally {
        self.per_strategy.get(&strategy).copied().unwrap_or_default()
    }

    pub fn total_failed(&self) -> usize {
        self.per_strategy.values().map(|t| t.failed).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Task: {} ({} records)", self.task, self.records)?;
        writeln!(
            f,
            "{:<15} {:>10} {:>10} {:>10}",
            "STRATEGY", "COMPLETED", "DEFAULTED", "FAILED"
        )?;
        for (kind, tally) in &self.per_strategy {
            writeln!(
                f,
                "{:<15} {:>10} {:>10} {:>10}",
                kind.as_str(),
                tally.completed,
                tally.defaulted,
                tally.failed
            )?;
        }
        Ok(())
    }
}

/// Per-record dispatcher over a worker pool and a serial lane
pub struct HybridScheduler {
    ctx: StrategyContext,
    store: SessionStore,
    options: SchedulerOptions,
    events: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl HybridScheduler {
    pub fn new(ctx: StrategyContext, store: SessionStore, mut options: SchedulerOptions) -> Self {
        // A strategy listed twice would race for its own session keys
        let mut seen = Vec::with_capacity(options.strategies.len());
        options.strategies.retain(|kind| {
            let first = !seen.contains(kind);
            seen.push(*kind);
            first
        });

        Self {
            ctx,
            store,
            options,
            events: None,
        }
    }

    /// Receive a [`SchedulerEvent`] for every state change
    pub fn with_observer(mut self, events: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Process every record of `source`, routing results to `sink`
    ///
    /// # Errors
    ///
    /// Only collaborator failures (reading records, writing results) end a
    /// run early. Strategy failures are recorded as failed results.
    pub async fn run(
        &self,
        source: &mut dyn RecordSource,
        sink: &mut dyn ResultSink,
    ) -> Result<RunSummary, EngineError> {
        let (parallel, serial): (Vec<StrategyKind>, Vec<StrategyKind>) = self
            .options
            .strategies
            .iter()
            .partition(|kind| kind.group() == ConcurrencyGroup::Parallel);

        let pool_size = self
            .options
            .concurrency_cap
            .map_or(parallel.len(), |cap| cap.min(parallel.len()))
            .max(1);
        let permits = Arc::new(Semaphore::new(pool_size));

        tracing::info!(
            "Starting task '{}': parallel {:?} on {} worker(s), serial {:?}",
            self.options.task,
            parallel,
            pool_size,
            serial
        );

        let mut lane = SerialLane::new(
            self.store.clone(),
            self.options.task.clone(),
            self.options.overwrite,
            self.options.memory,
        );
        let mut summary = RunSummary::new(&self.options.task, &self.options.strategies);

        let outcome = self
            .drive(source, sink, &parallel, &serial, &permits, &mut lane, &mut summary)
            .await;

        lane.close().await;
        let flushed = sink.flush();
        outcome?;
        flushed?;

        tracing::info!(
            "Task '{}' finished: {} records, {} failed results",
            summary.task,
            summary.records,
            summary.total_failed()
        );
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        source: &mut dyn RecordSource,
        sink: &mut dyn ResultSink,
        parallel: &[StrategyKind],
        serial: &[StrategyKind],
        permits: &Arc<Semaphore>,
        lane: &mut SerialLane,
        summary: &mut RunSummary,
    ) -> Result<(), EngineError> {
        let mut next_ordinal = 1;
        while let Some(mut record) = source.next_record()? {
            // Ordinals key the parallel sessions, so they are numbered here
            if record.ordinal != next_ordinal {
                tracing::debug!(
                    "Record {} arrived with ordinal {}, using {}",
                    record.id,
                    record.ordinal,
                    next_ordinal
                );
                record.ordinal = next_ordinal;
            }
            if record.id.trim().is_empty() {
                record.id = next_ordinal.to_string();
            }
            next_ordinal += 1;

            let record = Arc::new(record);
            let ordinal = record.ordinal;

            // Dispatched
            let mut pool = JoinSet::new();
            for &kind in parallel {
                pool.spawn(self.parallel_task(kind, Arc::clone(&record), Arc::clone(permits)));
            }
            self.emit(SchedulerEvent::RecordDispatched {
                ordinal,
                parallel: parallel.to_vec(),
            });

            let mut results: BTreeMap<StrategyKind, LabelResult> = BTreeMap::new();

            for &kind in serial {
                let result = lane
                    .run(kind, &self.ctx, &record)
                    .instrument(tracing::info_span!("serial", strategy = %kind, ordinal))
                    .await;
                self.finished(ordinal, &result);
                results.insert(kind, result);
            }

            // Awaiting
            while let Some(joined) = pool.join_next().await {
                match joined {
                    Ok(result) => {
                        self.finished(ordinal, &result);
                        results.insert(result.strategy, result);
                    }
                    Err(e) => tracing::error!("Worker for record {} was lost: {}", ordinal, e),
                }
            }

            for &kind in parallel {
                if !results.contains_key(&kind) {
                    let key = SessionKey::parallel(&self.options.task, ordinal, &record.title, kind);
                    let result = LabelResult::failed(
                        &record,
                        kind,
                        LabelFields::default(),
                        Failure::new(FailureKind::Internal, "worker was lost"),
                        key.to_string(),
                    );
                    self.finished(ordinal, &result);
                    results.insert(kind, result);
                }
            }

            // Collected
            for &kind in &self.options.strategies {
                if let Some(result) = results.remove(&kind) {
                    summary.record(&result);
                    sink.append(kind, result)?;
                }
            }
            self.emit(SchedulerEvent::RecordCollected { ordinal });

            // Advanced
            summary.records += 1;
            tracing::debug!("Record {} advanced", ordinal);
            self.emit(SchedulerEvent::RecordAdvanced { ordinal });
        }

        Ok(())
    }

    /// One pool task: fresh isolated session, strategy run, close
    ///
    /// A panic inside the strategy becomes a failed result.
    fn parallel_task(
        &self,
        kind: StrategyKind,
        record: Arc<Record>,
        permits: Arc<Semaphore>,
    ) -> impl std::future::Future<Output = LabelResult> + Send + 'static {
        let ctx = self.ctx.clone();
        let store = self.store.clone();
        let task = self.options.task.clone();
        let overwrite = self.options.overwrite;
        let span = tracing::info_span!("parallel", strategy = %kind, ordinal = record.ordinal);

        async move {
            let key = SessionKey::parallel(&task, record.ordinal, &record.title, kind);
            let trace = key.to_string();

            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return LabelResult::failed(
                        &record,
                        kind,
                        LabelFields::default(),
                        Failure::new(FailureKind::Internal, "worker pool closed"),
                        trace,
                    )
                }
            };

            let work = async {
                let mut session = store.open(key, SessionMode::Fresh, overwrite).await?;
                let result = run_strategy(kind, &ctx, &record, &mut session).await;
                if let Err(e) = session.close().await {
                    tracing::warn!("Failed to close {}: {}", session.key(), e);
                }
                Ok::<_, EngineError>(result)
            };

            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    tracing::warn!("{} could not start on record {}: {}", kind, record.id, e);
                    LabelResult::failed(
                        &record,
                        kind,
                        LabelFields::default(),
                        Failure::from(&e),
                        trace,
                    )
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "strategy panicked".to_string());
                    tracing::error!("{} panicked on record {}: {}", kind, record.id, message);
                    LabelResult::failed(
                        &record,
                        kind,
                        LabelFields::default(),
                        Failure::new(FailureKind::Internal, message),
                        trace,
                    )
                }
            }
        }
        .instrument(span)
    }

    fn finished(&self, ordinal: usize, result: &LabelResult) {
        self.emit(SchedulerEvent::TaskFinished {
            ordinal,
            strategy: result.strategy,
            status: result.status,
        });
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
