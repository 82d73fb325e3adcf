//! `single`: one request with the full rules and the record

use super::{exchange, parse, seed, StrategyContext, StrategyResult};
use crate::session::SessionHandle;
use sdk::types::{LabelFields, Record};

pub async fn run(
    ctx: &StrategyContext,
    record: &Record,
    session: &mut SessionHandle,
    fields: &mut LabelFields,
) -> StrategyResult {
    seed(session, ctx.prompts.single_system()).await?;

    let reply = exchange(ctx, session, ctx.prompts.record_prompt(record)).await?;
    parse::parse_label_line(&reply, fields)?;

    Ok(())
}
