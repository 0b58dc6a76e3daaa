use crate::linq::{
    ast::{AstSortDirection, AstSortField, AstStage},
    translators::{
        expression::{self, TranslationContext},
        QueryCall,
        Result,
        StageTranslator,
        TranslatedPipeline,
    },
    QueryMethod,
};

/// `OrderBy` and `OrderByDescending` start a `$sort`. `ThenBy` and `ThenByDescending` add a field
/// to the `$sort` that ends the pipeline, so a whole ordering is one stage.
pub(super) struct OrderByStageTranslator;

impl StageTranslator for OrderByStageTranslator {
    fn translate(
        &self,
        pipeline: TranslatedPipeline,
        call: &QueryCall<'_>,
    ) -> Result<TranslatedPipeline> {
        call.expect_arguments(&[2])?;
        let (parameters, key_selector) = call.lambda(1, 1)?;
        let context = TranslationContext::for_documents(&parameters[0], pipeline.output_serializer());
        let key = expression::translate(&context, key_selector)?;
        let path = key
            .ast
            .field_path()
            .ok_or_else(|| call.unsupported("only fields can be sorted on"))?
            .to_string();

        let (direction, then) = match call.method {
            QueryMethod::OrderBy => (AstSortDirection::Ascending, false),
            QueryMethod::OrderByDescending => (AstSortDirection::Descending, false),
            QueryMethod::ThenBy => (AstSortDirection::Ascending, true),
            _ => (AstSortDirection::Descending, true),
        };
        let field = AstSortField { path, direction };
        let serializer = pipeline.output_serializer().clone();

        if !then {
            return Ok(pipeline.add_stages(serializer, [AstStage::Sort(vec![field])]));
        }
        let mut fields = match pipeline.last_stage() {
            Some(AstStage::Sort(fields)) => fields.clone(),
            _ => {
                return Err(call.unsupported(format!(
                    "{} must follow OrderBy, OrderByDescending or another ThenBy",
                    call.method
                )))
            }
        };
        fields.push(field);
        Ok(pipeline.replace_last_stage(serializer, AstStage::Sort(fields)))
    }
}
