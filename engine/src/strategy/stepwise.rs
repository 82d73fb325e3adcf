//! `stepwise` and `stepwise_long`: three questions in one session
//!
//! Only the first question of a record carries its title and abstract; the
//! later ones lean on the transcript. For `stepwise_long` the same session
//! continues across records, so earlier records stay in the history.

use super::{exchange, parse, seed, StrategyContext, StrategyResult};
use crate::session::SessionHandle;
use sdk::types::{LabelFields, Record};

pub async fn run(
    ctx: &StrategyContext,
    record: &Record,
    session: &mut SessionHandle,
    fields: &mut LabelFields,
) -> StrategyResult {
    seed(session, ctx.prompts.step_system()).await?;

    let renewal = exchange(ctx, session, ctx.prompts.step_prompt(1, record, true)).await?;
    fields.urban_renewal = Some(parse::parse_binary(&renewal)?);

    let spatial = exchange(ctx, session, ctx.prompts.step_prompt(2, record, false)).await?;
    let spatial = parse::parse_binary(&spatial)?;
    fields.spatial_study = Some(spatial);

    let level = exchange(ctx, session, ctx.prompts.step_prompt(3, record, false)).await?;
    let (spatial_level, description) = parse::parse_level_line(&level, spatial)?;
    fields.spatial_level = spatial_level;
    fields.spatial_description = description;

    Ok(())
}
