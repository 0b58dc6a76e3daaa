use crate::{
    linq::{
        translators::{
            distinct::DistinctStageTranslator,
            group_by::GroupByStageTranslator,
            of_type::OfTypeStageTranslator,
            order_by::OrderByStageTranslator,
            select::SelectStageTranslator,
            select_many::SelectManyStageTranslator,
            skip_take::SkipTakeStageTranslator,
            where_stage::WhereStageTranslator,
            QueryCall,
            StageTranslator,
            TranslatedPipeline,
        },
        Expression,
        Method,
        QueryMethod,
        UnsupportedExpressionError,
    },
    trace::LINQ_TRACING_EVENT_TARGET,
};

/// Translates query expressions into aggregation pipelines.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct PipelineTranslator;

impl PipelineTranslator {
    /// Translates a chain of query method calls into the pipeline that computes its result.
    ///
    /// The innermost call is translated first, starting from an empty pipeline over the
    /// documents of the queryable, and each call appends its stages to the pipeline of its source.
    pub fn translate(
        expression: &Expression,
    ) -> std::result::Result<TranslatedPipeline, UnsupportedExpressionError> {
        let (method, arguments) = match expression {
            Expression::Queryable(serializer) => {
                return Ok(TranslatedPipeline::new(serializer.clone()))
            }
            Expression::Call {
                method: Method::Query(method),
                arguments,
            } => (*method, arguments),
            _ => {
                return Err(UnsupportedExpressionError::new(
                    expression,
                    "it is not a query method call",
                ))
            }
        };
        let source = arguments.first().ok_or_else(|| {
            UnsupportedExpressionError::new(expression, format!("{method} has no source"))
        })?;
        let pipeline = Self::translate(source)?;

        let call = QueryCall {
            expression,
            method,
            arguments,
        };
        let result = stage_translator(method).translate(pipeline, &call);
        match result {
            Ok(ref pipeline) => tracing::trace!(
                target: LINQ_TRACING_EVENT_TARGET,
                method = %method,
                stageCount = pipeline.stages().len(),
                "Translated query method"
            ),
            Err(ref error) => tracing::debug!(
                target: LINQ_TRACING_EVENT_TARGET,
                method = %method,
                reason = %error.reason,
                "Query method is not supported"
            ),
        }
        result
    }
}

fn stage_translator(method: QueryMethod) -> &'static dyn StageTranslator {
    match method {
        QueryMethod::Where => &WhereStageTranslator,
        QueryMethod::Select => &SelectStageTranslator,
        QueryMethod::GroupBy => &GroupByStageTranslator,
        QueryMethod::OrderBy
        | QueryMethod::OrderByDescending
        | QueryMethod::ThenBy
        | QueryMethod::ThenByDescending => &OrderByStageTranslator,
        QueryMethod::SelectMany => &SelectManyStageTranslator,
        QueryMethod::Distinct => &DistinctStageTranslator,
        QueryMethod::OfType => &OfTypeStageTranslator,
        QueryMethod::Skip | QueryMethod::Take => &SkipTakeStageTranslator,
    }
}
