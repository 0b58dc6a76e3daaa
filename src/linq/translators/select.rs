use crate::linq::{
    ast::{AstProjection, AstStage},
    translators::{
        expression::{self, TranslationContext},
        group_by,
        QueryCall,
        Result,
        StageTranslator,
        TranslatedPipeline,
    },
    DocumentSerializer,
    Expression,
    Serializer,
};

/// `Select(source, x => selector)` becomes a `$project`. Objects are projected field by field,
/// any other value is projected into `_v`.
pub(super) struct SelectStageTranslator;

impl StageTranslator for SelectStageTranslator {
    fn translate(
        &self,
        pipeline: TranslatedPipeline,
        call: &QueryCall<'_>,
    ) -> Result<TranslatedPipeline> {
        call.expect_arguments(&[2])?;
        let (parameters, selector) = call.lambda(1, 1)?;
        let parameter = &parameters[0];

        if matches!(selector, Expression::Parameter(name) if name == parameter) {
            return Ok(pipeline);
        }
        if let Some(fused) = group_by::fuse_select(&pipeline, call, parameter, selector)? {
            return Ok(fused);
        }

        let context = TranslationContext::for_documents(parameter, pipeline.output_serializer());
        let (fields, serializer) = match selector {
            Expression::New { members } => {
                let mut fields = Vec::with_capacity(members.len() + 1);
                let mut document = DocumentSerializer::new("AnonymousType");
                for (name, value) in members {
                    let value = expression::translate(&context, value)?;
                    fields.push((name.clone(), AstProjection::Set(value.ast)));
                    document = document.member(name.clone(), value.serializer);
                }
                if !members.iter().any(|(name, _)| name == "_id") {
                    fields.push(("_id".to_string(), AstProjection::Exclude));
                }
                (fields, Serializer::from(document))
            }
            _ => {
                let value = expression::translate(&context, selector)?;
                (
                    vec![
                        ("_v".to_string(), AstProjection::Set(value.ast)),
                        ("_id".to_string(), AstProjection::Exclude),
                    ],
                    Serializer::wrapped(value.serializer),
                )
            }
        };
        Ok(pipeline.add_stages(serializer, [AstStage::Project(fields)]))
    }
}
