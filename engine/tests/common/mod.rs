//! Shared helpers for engine integration tests

#![allow(dead_code)]

use annotator_engine::llm::{
    CompletionOptions, GatewayPolicy, InferenceGateway, LLMError, LLMProvider, Message,
    MessageRole,
};
use annotator_engine::prompts::PromptBook;
use annotator_engine::strategy::StrategyContext;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers like a well-behaved model, keyed on the request it receives
///
/// - a user turn containing `MALFORMED` gets an unparsable answer
/// - a user turn containing `BREAK_SINGLE` gets an unparsable answer unless
///   the system prompt asks for `<thinking>`, so only the single family fails
/// - a user turn containing `PANIC` panics inside the provider
/// - step questions, the reflection critique, and chain-of-thought system
///   prompts each get a matching answer
pub struct ScriptedProvider {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every transcript sent so far, in arrival order
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of requests that were in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn answer(messages: &[Message]) -> String {
        let system = messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        if last.contains("MALFORMED") {
            "I am not sure about this one.".to_string()
        } else if last.contains("BREAK_SINGLE") && !system.contains("<thinking>") {
            "Unclear.".to_string()
        } else if last.contains("Step 1:") {
            "1".to_string()
        } else if last.contains("Step 2:") {
            "1".to_string()
        } else if last.contains("Step 3:") {
            "city\tScripted City".to_string()
        } else if last.starts_with("Review your previous answer") {
            "1\t1\tcity\tRevised City".to_string()
        } else if system.contains("<thinking>") {
            "<thinking>The abstract names one city.</thinking>\n0\t1\tcity\tReasoned City"
                .to_string()
        } else {
            "1\t0\t\t".to_string()
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[Message],
        _options: &CompletionOptions,
    ) -> annotator_engine::llm::Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if messages
            .last()
            .is_some_and(|m| m.role == MessageRole::User && m.content.contains("PANIC"))
        {
            panic!("scripted provider panic");
        }

        Ok(Self::answer(messages))
    }
}

/// Provider that always fails with the given error
pub struct FailingProvider(pub LLMError);

#[async_trait]
impl LLMProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(
        &self,
        _messages: &[Message],
        _options: &CompletionOptions,
    ) -> annotator_engine::llm::Result<String> {
        Err(self.0.clone())
    }
}

/// Gateway policy with a single attempt and no waiting
pub fn quick_policy() -> GatewayPolicy {
    GatewayPolicy {
        max_attempts: 1,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
        requests_per_minute: None,
    }
}

pub fn context(provider: Arc<dyn LLMProvider>) -> StrategyContext {
    StrategyContext::new(
        Arc::new(InferenceGateway::new(provider, quick_policy())),
        Arc::new(PromptBook::default()),
        CompletionOptions::default(),
    )
}
