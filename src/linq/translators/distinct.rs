use crate::linq::{
    ast::{AstExpression, AstStage},
    translators::{QueryCall, Result, StageTranslator, TranslatedPipeline},
};

/// `Distinct(source)` groups on the whole document and promotes each group key back to the root.
pub(super) struct DistinctStageTranslator;

impl StageTranslator for DistinctStageTranslator {
    fn translate(
        &self,
        pipeline: TranslatedPipeline,
        call: &QueryCall<'_>,
    ) -> Result<TranslatedPipeline> {
        call.expect_arguments(&[1])?;
        let serializer = pipeline.output_serializer().clone();
        Ok(pipeline.add_stages(
            serializer,
            [
                AstStage::Group {
                    id: AstExpression::root(),
                    fields: Vec::new(),
                },
                AstStage::ReplaceRoot(AstExpression::field("_id")),
            ],
        ))
    }
}
