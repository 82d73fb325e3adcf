//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - run: Annotate a record file with the selected strategies
//! - strategies: List strategies and their concurrency group
//! - sessions list/view/delete: Inspect stored transcripts

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use crate::cli::RunArgs;
use crate::config::Config;
use crate::llm::openai::OpenAICompatibleProvider;
use crate::llm::{CompletionOptions, GatewayPolicy, InferenceGateway};
use crate::output::JsonlResultSink;
use crate::prompts::{PromptBook, ShotMode};
use crate::records::JsonlRecordSource;
use crate::scheduler::{HybridScheduler, MemoryBudget, SchedulerOptions};
use crate::session::key::sanitize_component;
use crate::session::{SessionIndex, SessionKey, SessionStore};
use crate::strategy::StrategyContext;
use sdk::types::StrategyKind;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Task name for an input file: its stem, made safe for paths
pub fn task_name_for(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    sanitize_component(&stem, None)
}

/// Build the strategy context from configuration
pub fn build_context(config: &Config, shot_mode: ShotMode) -> Result<StrategyContext> {
    let api_key = config.api_key().with_context(|| {
        format!(
            "No API key found. Set {} or llm.api_key in the config file",
            config.llm.api_key_env
        )
    })?;

    let provider = OpenAICompatibleProvider::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        Some(api_key),
    )
    .with_timeout(config.gateway.timeout());
    let model = provider.model().to_string();

    let gateway = InferenceGateway::new(Arc::new(provider), GatewayPolicy::from(&config.gateway));
    tracing::info!(
        "Using {} provider with model {} at {}",
        gateway.provider_name(),
        model,
        config.llm.base_url
    );

    let prompts = match &config.prompts.template_file {
        Some(path) => PromptBook::from_file(path, shot_mode)
            .with_context(|| format!("Failed to load prompt templates from {:?}", path))?,
        None => PromptBook::builtin(shot_mode),
    };

    Ok(StrategyContext::new(
        Arc::new(gateway),
        Arc::new(prompts),
        CompletionOptions {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        },
    ))
}

/// Annotate a record file
pub async fn handle_run(args: RunArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let strategies = match &args.strategy {
        Some(list) => StrategyKind::parse_list(list)?,
        None => config.scheduler.strategies.clone(),
    };
    let shot_mode = match &args.shot {
        Some(mode) => mode.parse()?,
        None => config.scheduler.shot_mode,
    };
    let concurrency_cap = args.concurrency.or(config.scheduler.concurrency_cap);
    if concurrency_cap == Some(0) {
        bail!("--concurrency must be at least 1");
    }

    let task = match &args.task {
        Some(name) => sanitize_component(name, None),
        None => task_name_for(&args.input),
    };

    let ctx = build_context(config, shot_mode)?;

    let mut store = SessionStore::new(config.sessions_dir());
    let index = if args.index || config.sessions.index_enabled {
        let index = SessionIndex::spawn(store.index_path());
        store = store.with_index(index.handle());
        Some(index)
    } else {
        None
    };

    let options = SchedulerOptions {
        task: task.clone(),
        strategies,
        concurrency_cap,
        overwrite: args.overwrite || config.sessions.overwrite,
        memory: MemoryBudget {
            max_context_tokens: config.memory.max_context_tokens,
            warning_threshold: config.memory.warning_threshold,
        },
    };

    let mut source = JsonlRecordSource::open(&args.input, args.limit)
        .with_context(|| format!("Failed to read records from {:?}", args.input))?;
    let mut sink = JsonlResultSink::create(&config.output_dir(&task), shot_mode)
        .context("Failed to prepare the output directory")?;

    tracing::info!(
        "Annotating {:?} as task '{}' with {} shot(s) mode",
        args.input,
        task,
        shot_mode
    );

    let scheduler = HybridScheduler::new(ctx, store, options);
    let outcome = scheduler.run(&mut source, &mut sink).await;

    drop(scheduler);
    if let Some(index) = index {
        index.shutdown().await;
    }

    let summary = outcome.context("Run aborted")?;
    let outputs = sink.paths();

    match format {
        OutputFormat::Text => {
            print!("{}", summary);
            for path in &outputs {
                println!("Results: {}", path.display());
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "summary": summary,
                "outputs": outputs,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// List strategies
pub fn handle_strategies(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{:<3} {:<15} {:<10} DESCRIPTION", "#", "STRATEGY", "GROUP");
            for (i, kind) in StrategyKind::ALL.iter().enumerate() {
                println!(
                    "{:<3} {:<15} {:<10} {}",
                    i + 1,
                    kind.as_str(),
                    kind.group(),
                    kind.description()
                );
            }
        }
        OutputFormat::Json => {
            let strategies: Vec<_> = StrategyKind::ALL
                .iter()
                .map(|kind| {
                    json!({
                        "name": kind,
                        "group": kind.group(),
                        "description": kind.description(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&strategies)?);
        }
    }
    Ok(())
}

/// List indexed sessions, newest first
pub async fn handle_sessions_list(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let store = SessionStore::new(config.sessions_dir());
    let mut entries = SessionIndex::read(&store.index_path())
        .await
        .context("Failed to read the session index")?;
    entries.truncate(limit);

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No indexed sessions. Runs record sessions with --index or sessions.index_enabled.");
                return Ok(());
            }

            for entry in &entries {
                println!(
                    "{}  {:>4} msgs  {}",
                    entry.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.message_count,
                    entry.key
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "sessions": entries,
                "count": entries.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Show one transcript
pub async fn handle_sessions_view(key: String, config: &Config, format: OutputFormat) -> Result<()> {
    let store = SessionStore::new(config.sessions_dir());
    let document = store
        .load(&key)
        .await
        .with_context(|| format!("Failed to load session {}", key))?;

    match format {
        OutputFormat::Text => {
            println!("Session: {}", document.key);
            println!("ID: {}", document.session_id);
            println!(
                "Created: {}",
                document.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            for message in &document.messages {
                println!("[{}]", message.role);
                println!("{}", message.content);
                println!();
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }
    Ok(())
}

/// Delete one transcript
pub async fn handle_sessions_delete(
    key: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let store = SessionStore::new(config.sessions_dir());
    store
        .delete(&key)
        .await
        .with_context(|| format!("Failed to delete session {}", key))?;

    let canonical = SessionKey::parse(&key)?.to_string();
    let unindexed = SessionIndex::remove(&store.index_path(), &canonical)
        .await
        .context("Failed to update the session index")?;
    if unindexed {
        tracing::debug!("Removed {} from the session index", key);
    }

    match format {
        OutputFormat::Text => println!("Deleted session {}", key),
        OutputFormat::Json => println!("{}", json!({ "deleted": key })),
    }
    Ok(())
}
