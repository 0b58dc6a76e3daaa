use crate::{
    bson::Bson,
    linq::{
        ast::{AstComparison, AstFilter, AstStage},
        translators::{
            expression::{self, TranslationContext},
            QueryCall,
            Result,
            StageTranslator,
            TranslatedPipeline,
        },
        BinaryOperator,
        Expression,
        Method,
        SequenceMethod,
        Serializer,
        ValueKind,
    },
};

/// `Where(source, p => predicate)` becomes a `$match`. Predicates that compare fields with
/// constants use the query language, anything else is wrapped in `$expr`.
pub(super) struct WhereStageTranslator;

impl StageTranslator for WhereStageTranslator {
    fn translate(
        &self,
        pipeline: TranslatedPipeline,
        call: &QueryCall<'_>,
    ) -> Result<TranslatedPipeline> {
        call.expect_arguments(&[2])?;
        let (parameters, predicate) = call.lambda(1, 1)?;
        let context = TranslationContext::for_documents(&parameters[0], pipeline.output_serializer());

        let filter = match translate_filter(&context, predicate) {
            Some(filter) => filter,
            None => AstFilter::Expr(expression::translate(&context, predicate)?.ast),
        };
        let serializer = pipeline.output_serializer().clone();
        Ok(pipeline.add_stages(serializer, [AstStage::Match(filter)]))
    }
}

/// The query language form of a predicate, if it has one.
fn translate_filter(context: &TranslationContext, predicate: &Expression) -> Option<AstFilter> {
    match predicate {
        Expression::Binary {
            operator: operator @ (BinaryOperator::AndAlso | BinaryOperator::OrElse),
            left,
            right,
        } => {
            let is_and = *operator == BinaryOperator::AndAlso;
            let mut filters = Vec::new();
            for side in [left, right] {
                match (translate_filter(context, side)?, is_and) {
                    (AstFilter::And(nested), true) | (AstFilter::Or(nested), false) => {
                        filters.extend(nested)
                    }
                    (filter, _) => filters.push(filter),
                }
            }
            Some(if is_and {
                AstFilter::And(filters)
            } else {
                AstFilter::Or(filters)
            })
        }
        Expression::Binary {
            operator,
            left,
            right,
        } if operator.is_comparison() => match (field_path(context, left), &**right) {
            (Some(path), Expression::Constant(value)) => Some(AstFilter::Field {
                path,
                comparison: comparison(*operator, value.clone()),
            }),
            _ => match (&**left, field_path(context, right)) {
                (Expression::Constant(value), Some(path)) => Some(AstFilter::Field {
                    path,
                    comparison: comparison(operator.flipped(), value.clone()),
                }),
                _ => None,
            },
        },
        Expression::Not(operand) => Some(AstFilter::Nor(vec![translate_filter(context, operand)?])),
        Expression::Call {
            method: Method::Sequence(SequenceMethod::Contains),
            arguments,
        } => match arguments.as_slice() {
            [Expression::Constant(Bson::Array(values)), item] => Some(AstFilter::Field {
                path: field_path(context, item)?,
                comparison: AstComparison::In(values.clone()),
            }),
            _ => None,
        },
        Expression::Member { .. } => {
            let member = expression::translate(context, predicate).ok()?;
            match member.serializer {
                Serializer::Value(ValueKind::Boolean) => Some(AstFilter::Field {
                    path: member.ast.field_path()?.to_string(),
                    comparison: AstComparison::Eq(Bson::Boolean(true)),
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

fn field_path(context: &TranslationContext, expression: &Expression) -> Option<String> {
    let translation = expression::translate(context, expression).ok()?;
    translation.ast.field_path().map(ToString::to_string)
}

fn comparison(operator: BinaryOperator, value: Bson) -> AstComparison {
    match operator {
        BinaryOperator::NotEqual => AstComparison::Ne(value),
        BinaryOperator::GreaterThan => AstComparison::Gt(value),
        BinaryOperator::GreaterThanOrEqual => AstComparison::Gte(value),
        BinaryOperator::LessThan => AstComparison::Lt(value),
        BinaryOperator::LessThanOrEqual => AstComparison::Lte(value),
        _ => AstComparison::Eq(value),
    }
}
