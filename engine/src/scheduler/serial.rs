//! Serial lane
//!
//! Owns the long-lived sessions of serial-group strategies. The lane runs on
//! the scheduler's control flow only, so each of its sessions has exactly
//! one writer and sees records in input order.

use crate::session::{SessionHandle, SessionKey, SessionMode, SessionStore};
use crate::strategy::{run_strategy, StrategyContext};
use sdk::errors::EngineError;
use sdk::types::{Failure, LabelFields, LabelResult, Record, StrategyKind};
use std::collections::BTreeMap;

// Upper bound on segments skipped while looking for one with room left
const MAX_SEGMENT_SCAN: u32 = 1_000;

/// Context budget for long-lived sessions
#[derive(Debug, Clone, Copy)]
pub struct MemoryBudget {
    pub max_context_tokens: usize,
    pub warning_threshold: f64,
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self {
            max_context_tokens: 128_000,
            warning_threshold: 0.9,
        }
    }
}

struct LaneSession {
    segment: u32,
    handle: SessionHandle,
}

pub struct SerialLane {
    store: SessionStore,
    task: String,
    overwrite: bool,
    budget: MemoryBudget,
    sessions: BTreeMap<StrategyKind, LaneSession>,
}

impl SerialLane {
    pub fn new(store: SessionStore, task: impl Into<String>, overwrite: bool, budget: MemoryBudget) -> Self {
        Self {
            store,
            task: task.into(),
            overwrite,
            budget,
            sessions: BTreeMap::new(),
        }
    }

    /// Current segment of a strategy's session, if one is open
    pub fn segment(&self, kind: StrategyKind) -> Option<u32> {
        self.sessions.get(&kind).map(|s| s.segment)
    }

    /// Run `kind` for `record` on its long-lived session
    pub async fn run(
        &mut self,
        kind: StrategyKind,
        ctx: &StrategyContext,
        record: &Record,
    ) -> LabelResult {
        match self.session_for(kind).await {
            Ok(session) => run_strategy(kind, ctx, record, session).await,
            Err(e) => {
                tracing::warn!("{} has no usable session for record {}: {}", kind, record.id, e);
                let trace = SessionKey::serial(&self.task, kind, 1).to_string();
                LabelResult::failed(record, kind, LabelFields::default(), Failure::from(&e), trace)
            }
        }
    }

    /// Close every open session
    pub async fn close(&mut self) {
        for (kind, mut lane) in std::mem::take(&mut self.sessions) {
            if let Err(e) = lane.handle.close().await {
                tracing::warn!("Failed to close {} session: {}", kind, e);
            }
        }
    }

    async fn session_for(&mut self, kind: StrategyKind) -> Result<&mut SessionHandle, EngineError> {
        let full = match self.sessions.get(&kind) {
            Some(lane) => self.is_full(&lane.handle),
            None => false,
        };

        if full {
            if let Some(mut lane) = self.sessions.remove(&kind) {
                tracing::warn!(
                    "Context full for {} (about {} tokens), starting segment {}",
                    lane.handle.key(),
                    lane.handle.estimated_tokens(),
                    lane.segment + 1
                );
                lane.handle.close().await?;
                let next = self.open_segment(kind, lane.segment + 1).await?;
                self.sessions.insert(kind, next);
            }
        }

        if !self.sessions.contains_key(&kind) {
            let lane = self.open_segment(kind, 1).await?;
            self.sessions.insert(kind, lane);
        }

        self.sessions
            .get_mut(&kind)
            .map(|lane| &mut lane.handle)
            .ok_or_else(|| EngineError::SessionStore(format!("{} session missing", kind)))
    }

    /// Open `segment` or, when continuing a full one, the first later segment with room
    async fn open_segment(&self, kind: StrategyKind, segment: u32) -> Result<LaneSession, EngineError> {
        let mode = if self.overwrite {
            SessionMode::Fresh
        } else {
            SessionMode::Continue
        };

        for segment in segment..segment.saturating_add(MAX_SEGMENT_SCAN) {
            let key = SessionKey::serial(&self.task, kind, segment);
            let handle = self.store.open(key, mode, self.overwrite).await?;

            if !self.is_full(&handle) {
                if !handle.is_empty() {
                    tracing::info!(
                        "Continuing {} with {} earlier messages",
                        handle.key(),
                        handle.len()
                    );
                }
                return Ok(LaneSession { segment, handle });
            }
        }

        Err(EngineError::SessionStore(format!(
            "no {} segment with free context",
            kind
        )))
    }

    fn is_full(&self, handle: &SessionHandle) -> bool {
        handle.is_context_full(self.budget.max_context_tokens, self.budget.warning_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use crate::strategy::test_support::{context, QueueProvider};
    use sdk::types::LabelStatus;

    #[tokio::test]
    async fn test_rotates_when_context_is_full() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let budget = MemoryBudget {
            max_context_tokens: 40,
            warning_threshold: 0.5,
        };
        let mut lane = SerialLane::new(store.clone(), "t", false, budget);

        let replies = (0..6).map(|i| Ok(if i % 3 == 2 { "\t".to_string() } else { "0".to_string() }));
        let ctx = context(QueueProvider::new(replies.collect()));

        let first = lane
            .run(StrategyKind::StepwiseLong, &ctx, &Record::new("1", 1, "a", "b"))
            .await;
        assert_eq!(first.status, LabelStatus::Completed);
        assert_eq!(lane.segment(StrategyKind::StepwiseLong), Some(1));

        // The system prompt alone exceeds 20 estimated tokens
        let second = lane
            .run(StrategyKind::StepwiseLong, &ctx, &Record::new("2", 2, "c", "d"))
            .await;
        assert_eq!(second.status, LabelStatus::Completed);
        assert_eq!(lane.segment(StrategyKind::StepwiseLong), Some(2));
        assert_eq!(second.trace, "t/stepwise_long-2");

        lane.close().await;
        assert!(store.exists(&SessionKey::serial("t", StrategyKind::StepwiseLong, 1)).await);
        assert!(store.exists(&SessionKey::serial("t", StrategyKind::StepwiseLong, 2)).await);
    }

    #[tokio::test]
    async fn test_continues_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let key = SessionKey::serial("t", StrategyKind::StepwiseLong, 1);

        let mut earlier = store.open(key.clone(), SessionMode::Fresh, false).await.unwrap();
        earlier.append(Message::system("old rules")).await.unwrap();
        earlier.close().await.unwrap();

        let mut lane = SerialLane::new(store.clone(), "t", false, MemoryBudget::default());
        let ctx = context(QueueProvider::new(vec![
            Ok("0".into()),
            Ok("0".into()),
            Ok("\t".into()),
        ]));
        lane.run(StrategyKind::StepwiseLong, &ctx, &Record::new("1", 1, "a", "b"))
            .await;
        lane.close().await;

        let doc = store.load(&key.to_string()).await.unwrap();
        assert_eq!(doc.messages[0], Message::system("old rules"));
        assert_eq!(doc.messages.len(), 7);
    }

    #[tokio::test]
    async fn test_overwrite_starts_clean() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let key = SessionKey::serial("t", StrategyKind::StepwiseLong, 1);

        let mut earlier = store.open(key.clone(), SessionMode::Fresh, false).await.unwrap();
        earlier.append(Message::system("old rules")).await.unwrap();
        earlier.close().await.unwrap();

        let mut lane = SerialLane::new(store.clone(), "t", true, MemoryBudget::default());
        let ctx = context(QueueProvider::new(vec![
            Ok("0".into()),
            Ok("0".into()),
            Ok("\t".into()),
        ]));
        lane.run(StrategyKind::StepwiseLong, &ctx, &Record::new("1", 1, "a", "b"))
            .await;
        lane.close().await;

        let doc = store.load(&key.to_string()).await.unwrap();
        assert_ne!(doc.messages[0], Message::system("old rules"));
    }
}
