//! `reflection`: initial answer, then critique-and-revise
//!
//! Only the revision is parsed. The first answer stays in the transcript
//! for the critique to work on.

use super::{exchange, parse, seed, StrategyContext, StrategyResult};
use crate::session::SessionHandle;
use sdk::types::{LabelFields, Record};

pub async fn run(
    ctx: &StrategyContext,
    record: &Record,
    session: &mut SessionHandle,
    fields: &mut LabelFields,
) -> StrategyResult {
    seed(session, ctx.prompts.reflection_system()).await?;

    let initial = exchange(ctx, session, ctx.prompts.record_prompt(record)).await?;
    tracing::debug!(
        "Reflection first pass for record {}: {:?}",
        record.id,
        parse::first_line(&initial)
    );

    let revised = exchange(ctx, session, ctx.prompts.reflection_critique().to_string()).await?;
    parse::parse_label_line(parse::extract_answer(&revised), fields)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::llm::LLMError;
    use sdk::types::{Binary, SpatialLevel, StrategyKind};

    #[tokio::test]
    async fn test_result_comes_from_revision() {
        let dir = tempfile::tempdir().unwrap();
        let record = Record::new("r1", 1, "Village renewal", "Three villages in Chengdu.");
        let provider = QueueProvider::new(vec![
            Ok("0\t0\t\t".into()),
            Ok("1\t1\tcity\tChengdu".into()),
        ]);
        let ctx = context(provider.clone());
        let mut session = session(&dir, &record, StrategyKind::Reflection).await;
        let mut fields = LabelFields::default();

        run(&ctx, &record, &mut session, &mut fields).await.unwrap();

        assert_eq!(fields.urban_renewal, Some(Binary::Yes));
        assert_eq!(fields.spatial_level, Some(SpatialLevel::City));
        assert_eq!(session.len(), 5);

        // The critique request carries the first answer in its history
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[1][2].content, "0\t0\t\t");
    }

    #[tokio::test]
    async fn test_failed_revision_fails_the_unit() {
        let dir = tempfile::tempdir().unwrap();
        let record = Record::new("r1", 1, "Village renewal", "Three villages.");
        let provider = QueueProvider::new(vec![
            Ok("1\t0\t\t".into()),
            Err(LLMError::InvalidRequest("too long".into())),
        ]);
        let ctx = context(provider);
        let mut session = session(&dir, &record, StrategyKind::Reflection).await;
        let mut fields = LabelFields::default();

        assert!(run(&ctx, &record, &mut session, &mut fields).await.is_err());
        assert_eq!(fields, LabelFields::default());
    }
}
