//! Strategy units
//!
//! Each strategy family is a plain async function over a record and an
//! exclusively borrowed session handle. Units keep no state of their own
//! between records; everything a unit remembers lives in its session.
//!
//! Failures never escape [`run_strategy`]: parse errors, exhausted retries,
//! and session errors all become a [`LabelResult`] with status `Failed` and
//! whatever fields were parsed before the failure.

pub mod cot;
pub mod parse;
pub mod reflection;
pub mod single;
pub mod stepwise;

use crate::llm::{CompletionOptions, GatewayError, InferenceGateway, Message};
use crate::prompts::PromptBook;
use crate::session::SessionHandle;
use sdk::errors::EngineError;
use sdk::types::{Failure, LabelFields, LabelResult, Record, StrategyKind};
use std::sync::Arc;

/// What every strategy unit needs besides its record and session
#[derive(Clone)]
pub struct StrategyContext {
    pub gateway: Arc<InferenceGateway>,
    pub prompts: Arc<PromptBook>,
    pub options: CompletionOptions,
}

impl StrategyContext {
    pub fn new(
        gateway: Arc<InferenceGateway>,
        prompts: Arc<PromptBook>,
        options: CompletionOptions,
    ) -> Self {
        Self {
            gateway,
            prompts,
            options,
        }
    }
}

/// Why a strategy unit stopped early
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error(transparent)]
    Inference(#[from] GatewayError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl StrategyError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, StrategyError::Engine(EngineError::MalformedOutput(_)))
    }
}

impl From<StrategyError> for EngineError {
    fn from(error: StrategyError) -> Self {
        match error {
            StrategyError::Inference(e) => e.into(),
            StrategyError::Engine(e) => e,
        }
    }
}

pub type StrategyResult = Result<(), StrategyError>;

/// Run one strategy for one record on an open session
pub async fn run_strategy(
    kind: StrategyKind,
    ctx: &StrategyContext,
    record: &Record,
    session: &mut SessionHandle,
) -> LabelResult {
    let mut fields = LabelFields::default();

    let outcome = match kind {
        StrategyKind::Single => single::run(ctx, record, session, &mut fields).await,
        StrategyKind::Stepwise | StrategyKind::StepwiseLong => {
            stepwise::run(ctx, record, session, &mut fields).await
        }
        StrategyKind::Cot => cot::run(ctx, record, session, &mut fields).await,
        StrategyKind::Reflection => reflection::run(ctx, record, session, &mut fields).await,
    };

    finish(kind, record, session.key().to_string(), fields, outcome)
}

/// Turn a unit outcome into its label result
pub fn finish(
    kind: StrategyKind,
    record: &Record,
    trace: String,
    fields: LabelFields,
    outcome: StrategyResult,
) -> LabelResult {
    match outcome {
        Ok(()) => LabelResult::completed(record, kind, fields, trace),
        Err(e) if e.is_malformed() && record.abstract_is_blank() => {
            tracing::info!(
                "Record {} has no abstract and {} gave no usable answer, applying the default",
                record.id,
                kind
            );
            LabelResult::defaulted(record, kind, trace)
        }
        Err(e) => {
            let error = EngineError::from(e);
            tracing::warn!("{} failed on record {}: {}", kind, record.id, error);
            LabelResult::failed(record, kind, fields, Failure::from(&error), trace)
        }
    }
}

/// Append the system prompt unless the session already has history
pub(crate) async fn seed(
    session: &mut SessionHandle,
    system_prompt: String,
) -> Result<(), EngineError> {
    if session.is_empty() {
        session.append(Message::system(system_prompt)).await?;
    }
    Ok(())
}

/// Assistant turn recorded when the gateway gave no answer
pub const NO_ANSWER: &str = "[no answer]";

/// Append a user turn, ask the model with the full transcript, append the reply
pub(crate) async fn exchange(
    ctx: &StrategyContext,
    session: &mut SessionHandle,
    prompt: String,
) -> Result<String, StrategyError> {
    session.append(Message::user(prompt)).await?;

    let reply = match ctx.gateway.complete(session.messages(), &ctx.options).await {
        Ok(reply) => reply,
        Err(e) => {
            // Close the turn so a later user turn still follows an assistant one
            if let Err(err) = session.append(Message::assistant(NO_ANSWER)).await {
                tracing::warn!("Could not close turn in {}: {}", session.key(), err);
            }
            return Err(e.into());
        }
    };

    session.append(Message::assistant(reply.clone())).await?;
    Ok(reply)
}
