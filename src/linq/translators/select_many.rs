use crate::linq::{
    ast::{AstExpression, AstProjection, AstStage},
    translators::{
        expression::{self, TranslationContext},
        QueryCall,
        Result,
        StageTranslator,
        TranslatedPipeline,
    },
    Expression,
    Serializer,
};

/// `SelectMany(source, x => collection)` projects the collection into `_v` and unwinds it. With a
/// result selector `(x, y) => result`, the result is computed for every item with `$map` before
/// unwinding, unless it just returns the item.
pub(super) struct SelectManyStageTranslator;

impl StageTranslator for SelectManyStageTranslator {
    fn translate(
        &self,
        pipeline: TranslatedPipeline,
        call: &QueryCall<'_>,
    ) -> Result<TranslatedPipeline> {
        call.expect_arguments(&[2, 3])?;
        let (parameters, collection_selector) = call.lambda(1, 1)?;
        let context = TranslationContext::for_documents(&parameters[0], pipeline.output_serializer());
        let collection = expression::translate(&context, collection_selector)?;
        let items = expression::sequence_items(&collection).ok_or_else(|| {
            call.unsupported(format!(
                "{} is not a sequence",
                collection.serializer.type_name()
            ))
        })?;

        let result_selector = if call.arguments.len() == 3 {
            let (parameters, result_selector) = call.lambda(2, 2)?;
            match result_selector {
                Expression::Parameter(name) if *name == parameters[1] => None,
                _ => Some((parameters, result_selector)),
            }
        } else {
            None
        };

        let (value, item_serializer) = if let Some((parameters, result_selector)) = result_selector {
            let item = &parameters[1];
            let result_context = TranslationContext::for_documents(&parameters[0], pipeline.output_serializer())
                .with_symbol(item, AstExpression::Variable(item.clone()), items.serializer);
            let result = expression::translate(&result_context, result_selector)?;
            let value = AstExpression::Map {
                input: Box::new(items.ast),
                variable: item.clone(),
                body: Box::new(result.ast),
            };
            (value, result.serializer)
        } else {
            (items.ast, items.serializer)
        };

        Ok(pipeline.add_stages(
            Serializer::wrapped(item_serializer),
            [
                AstStage::Project(vec![
                    ("_v".to_string(), AstProjection::Set(value)),
                    ("_id".to_string(), AstProjection::Exclude),
                ]),
                AstStage::Unwind("_v".to_string()),
            ],
        ))
    }
}
