//! Language-Model Provider Abstraction Layer
//!
//! This module provides a common interface for talking to a chat-completion
//! service. The `LLMProvider` trait defines the contract a provider must
//! implement; the `InferenceGateway` wraps one provider with timeouts,
//! request-rate limiting, and retry/backoff so strategy units only ever see
//! a single `complete` call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod gateway;
pub mod openai;

pub use gateway::{GatewayError, GatewayPolicy, InferenceGateway};

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl LLMError {
    /// Whether another attempt may succeed
    ///
    /// Rate limits, timeouts, transport failures, and server-side outages are
    /// transient. Credential, request-shape, and response-shape errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::RateLimitExceeded
                | LLMError::Timeout
                | LLMError::NetworkError(_)
                | LLMError::ProviderUnavailable(_)
        )
    }
}

/// Message in a conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Per-request sampling options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 500,
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "openai-compatible")
    fn name(&self) -> &str;

    /// Send the transcript and return the assistant's reply text
    ///
    /// # Arguments
    /// * `messages` - Full transcript, system prompt first
    /// * `options` - Sampling options for this request
    ///
    /// # Returns
    /// * `Ok(String)` - The reply content
    /// * `Err(LLMError)` - If the request fails
    async fn complete(&self, messages: &[Message], options: &CompletionOptions)
        -> Result<String>;
}
