//! Annotator Engine Library
//!
//! This library provides the hybrid scheduler, the isolated session store,
//! and the strategy units of the annotator. It is used by both the main
//! binary and integration tests.

/// Configuration management module
pub mod config;

/// LLM provider abstraction layer and inference gateway
pub mod llm;

/// Prompt templates and shot modes
pub mod prompts;

/// Isolated, persisted conversation sessions
pub mod session;

/// Strategy units
pub mod strategy;

/// Hybrid parallel/serial scheduler
pub mod scheduler;

/// JSON Lines record source
pub mod records;

/// JSON Lines result sink
pub mod output;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
