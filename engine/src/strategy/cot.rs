//! `cot`: reasoning inside `<thinking>` tags, then the answer line

use super::{exchange, parse, seed, StrategyContext, StrategyResult};
use crate::session::SessionHandle;
use sdk::types::{LabelFields, Record};

pub async fn run(
    ctx: &StrategyContext,
    record: &Record,
    session: &mut SessionHandle,
    fields: &mut LabelFields,
) -> StrategyResult {
    seed(session, ctx.prompts.cot_system()).await?;

    let reply = exchange(ctx, session, ctx.prompts.record_prompt(record)).await?;
    parse::parse_label_line(parse::extract_answer(&reply), fields)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use sdk::types::{Binary, StrategyKind};

    #[tokio::test]
    async fn test_answer_parsed_past_reasoning() {
        let dir = tempfile::tempdir().unwrap();
        let record = Record::new("r1", 1, "Gentrification theory", "A review.");
        let reply = "<thinking>\n1\tThis line has a tab but is reasoning.\nNo study area.\n</thinking>\n1\t0\t\t";
        let provider = QueueProvider::new(vec![Ok(reply.into())]);
        let ctx = context(provider);
        let mut session = session(&dir, &record, StrategyKind::Cot).await;
        let mut fields = LabelFields::default();

        run(&ctx, &record, &mut session, &mut fields).await.unwrap();

        assert_eq!(fields.urban_renewal, Some(Binary::Yes));
        assert_eq!(fields.spatial_study, Some(Binary::No));
        assert!(session.messages()[0].content.contains("<thinking>"));
        // The full reasoning stays in the transcript
        assert_eq!(session.messages()[2].content, reply);
    }
}
