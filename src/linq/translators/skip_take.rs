use crate::{
    bson::Bson,
    linq::{
        ast::AstStage,
        translators::{QueryCall, Result, StageTranslator, TranslatedPipeline},
        Expression,
        QueryMethod,
    },
};

/// `Skip(source, n)` becomes `$skip` and `Take(source, n)` becomes `$limit`. The count must be a
/// non-negative integer constant.
pub(super) struct SkipTakeStageTranslator;

impl StageTranslator for SkipTakeStageTranslator {
    fn translate(
        &self,
        pipeline: TranslatedPipeline,
        call: &QueryCall<'_>,
    ) -> Result<TranslatedPipeline> {
        call.expect_arguments(&[2])?;
        let count = match call.argument(1)? {
            Expression::Constant(Bson::Int32(count)) => i64::from(*count),
            Expression::Constant(Bson::Int64(count)) => *count,
            _ => return Err(call.unsupported("the count is not an integer constant")),
        };
        if count < 0 {
            return Err(call.unsupported(format!("the count {count} is negative")));
        }

        let stage = match call.method {
            QueryMethod::Skip => AstStage::Skip(count),
            _ => AstStage::Limit(count),
        };
        let serializer = pipeline.output_serializer().clone();
        Ok(pipeline.add_stages(serializer, [stage]))
    }
}
