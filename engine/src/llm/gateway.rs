//! Inference Gateway
//!
//! Wraps one provider with the failure model the scheduler relies on:
//! every call carries a timeout, transient failures are retried with
//! exponential backoff up to a bounded number of attempts, and fatal
//! failures surface immediately. An optional requests-per-minute limiter
//! keeps a busy worker pool under the provider's quota.

use super::{CompletionOptions, LLMError, LLMProvider, Message};
use crate::config::GatewayConfig;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use sdk::errors::EngineError;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Retry and timeout policy
#[derive(Debug, Clone)]
pub struct GatewayPolicy {
    /// Attempts per call, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Upper bound for any single delay
    pub max_backoff: Duration,

    /// Timeout applied to each attempt
    pub timeout: Duration,

    /// Optional request rate cap
    pub requests_per_minute: Option<NonZeroU32>,
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self::from(&GatewayConfig::default())
    }
}

impl From<&GatewayConfig> for GatewayPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
            timeout: config.timeout(),
            requests_per_minute: config.requests_per_minute.and_then(NonZeroU32::new),
        }
    }
}

impl GatewayPolicy {
    /// Delay before retry number `retry` (1-based): `initial * 2^(retry-1)`, capped
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Why a gateway call gave up
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: LLMError },

    #[error("{0}")]
    Fatal(LLMError),
}

impl From<GatewayError> for EngineError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Exhausted { .. } => EngineError::TransientService(error.to_string()),
            GatewayError::Fatal(inner) => EngineError::Provider(inner.to_string()),
        }
    }
}

/// Rate-limited, retrying front for one provider
///
/// Shared across the worker pool behind an `Arc`; every method takes `&self`.
pub struct InferenceGateway {
    provider: Arc<dyn LLMProvider>,
    policy: GatewayPolicy,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl InferenceGateway {
    pub fn new(provider: Arc<dyn LLMProvider>, policy: GatewayPolicy) -> Self {
        let limiter = policy
            .requests_per_minute
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Self {
            provider,
            policy,
            limiter,
        }
    }

    pub fn policy(&self) -> &GatewayPolicy {
        &self.policy
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Send a transcript and return the reply text
    pub async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<String, GatewayError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            tracing::debug!(
                "Calling {} (attempt {}/{}, {} messages)",
                self.provider.name(),
                attempt,
                self.policy.max_attempts,
                messages.len()
            );

            let result =
                tokio::time::timeout(self.policy.timeout, self.provider.complete(messages, options))
                    .await;

            let error = match result {
                Ok(Ok(reply)) => return Ok(reply),
                Ok(Err(e)) => e,
                Err(_) => LLMError::Timeout,
            };

            if !error.is_transient() {
                tracing::warn!("{} failed permanently: {}", self.provider.name(), error);
                return Err(GatewayError::Fatal(error));
            }

            if attempt >= self.policy.max_attempts {
                tracing::error!(
                    "{} still failing after {} attempts: {}",
                    self.provider.name(),
                    attempt,
                    error
                );
                return Err(GatewayError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.policy.backoff_for(attempt);
            tracing::warn!(
                "{} attempt {} failed: {}; retrying in {:?}",
                self.provider.name(),
                attempt,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}
