use crate::{
    bson::Bson,
    linq::{
        ast::{
            AstAccumulator,
            AstAccumulatorOperator,
            AstExpression,
            AstProjection,
            AstStage,
        },
        translators::{
            expression::{self, TranslationContext},
            QueryCall,
            Result,
            StageTranslator,
            TranslatedPipeline,
        },
        DocumentSerializer,
        Expression,
        Method,
        SequenceMethod,
        Serializer,
        ValueKind,
    },
};

/// The field a key-only group pushes its documents into.
pub(super) const ELEMENTS_FIELD: &str = "_elements";

/// `GroupBy(source, x => key)` becomes a `$group` on the key that pushes each document into
/// `_elements`. `GroupBy(source, x => key, (k, g) => new { .. })` computes every member of the
/// result with a `$group` accumulator instead and drops `_id` with a `$project`.
pub(super) struct GroupByStageTranslator;

impl StageTranslator for GroupByStageTranslator {
    fn translate(
        &self,
        pipeline: TranslatedPipeline,
        call: &QueryCall<'_>,
    ) -> Result<TranslatedPipeline> {
        call.expect_arguments(&[2, 3])?;
        let (parameters, key_selector) = call.lambda(1, 1)?;
        let context = TranslationContext::for_documents(&parameters[0], pipeline.output_serializer());
        let key = expression::translate(&context, key_selector)?;
        let element = GroupElement::of(pipeline.output_serializer());

        if call.arguments.len() == 2 {
            let stage = AstStage::Group {
                id: key.ast,
                fields: vec![(
                    ELEMENTS_FIELD.to_string(),
                    AstAccumulator::new(AstAccumulatorOperator::Push, element.ast),
                )],
            };
            let serializer = Serializer::grouping(key.serializer, element.serializer);
            return Ok(pipeline.add_stages(serializer, [stage]));
        }

        let (parameters, selector) = call.lambda(2, 2)?;
        let group = GroupingSelector {
            call,
            key: &key.ast,
            key_serializer: &key.serializer,
            key_parameter: Some(parameters[0].as_str()),
            grouping_parameter: &parameters[1],
            element: &element,
        };
        let (fields, serializer) = group.translate(selector)?;
        Ok(pipeline.add_stages(
            serializer,
            [
                AstStage::Group {
                    id: key.ast.clone(),
                    fields,
                },
                AstStage::Project(vec![("_id".to_string(), AstProjection::Exclude)]),
            ],
        ))
    }
}

/// What a group collects from each of its documents.
#[derive(Clone, Debug)]
pub(super) struct GroupElement {
    pub(super) ast: AstExpression,
    pub(super) serializer: Serializer,
}

impl GroupElement {
    fn of(serializer: &Serializer) -> Self {
        match serializer {
            Serializer::Wrapped(inner) => Self {
                ast: AstExpression::field("_v"),
                serializer: (**inner).clone(),
            },
            other => Self {
                ast: AstExpression::root(),
                serializer: other.clone(),
            },
        }
    }
}

/// Fuses `Select(g => new { .. })` into a preceding key-only group, so that the members are
/// computed by accumulators rather than from the pushed `_elements` array.
///
/// Returns `None` when the pipeline does not end in a key-only group or the selector does not
/// construct an object.
pub(super) fn fuse_select(
    pipeline: &TranslatedPipeline,
    call: &QueryCall<'_>,
    parameter: &str,
    selector: &Expression,
) -> Result<Option<TranslatedPipeline>> {
    let (key, element_ast) = match pipeline.last_stage() {
        Some(AstStage::Group { id, fields }) => match fields.as_slice() {
            [(name, accumulator)]
                if name == ELEMENTS_FIELD
                    && accumulator.operator == AstAccumulatorOperator::Push =>
            {
                (id, &accumulator.arg)
            }
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };
    let (key_serializer, element_serializer) = match pipeline.output_serializer() {
        Serializer::Grouping { key, element } => (key, element),
        _ => return Ok(None),
    };
    if !matches!(selector, Expression::New { .. }) {
        return Ok(None);
    }

    let element = GroupElement {
        ast: element_ast.clone(),
        serializer: (**element_serializer).clone(),
    };
    let group = GroupingSelector {
        call,
        key,
        key_serializer,
        key_parameter: None,
        grouping_parameter: parameter,
        element: &element,
    };
    let (fields, serializer) = group.translate(selector)?;
    let group_stage = AstStage::Group {
        id: key.clone(),
        fields,
    };
    let fused = pipeline
        .clone()
        .replace_last_stage(serializer.clone(), group_stage)
        .add_stages(
            serializer,
            [AstStage::Project(vec![(
                "_id".to_string(),
                AstProjection::Exclude,
            )])],
        );
    Ok(Some(fused))
}

/// A result selector over a grouping, translated member by member into accumulators.
struct GroupingSelector<'a> {
    call: &'a QueryCall<'a>,
    key: &'a AstExpression,
    key_serializer: &'a Serializer,
    /// The parameter bound to the key in the `(k, g) => ..` form.
    key_parameter: Option<&'a str>,
    grouping_parameter: &'a str,
    element: &'a GroupElement,
}

impl GroupingSelector<'_> {
    fn translate(
        &self,
        selector: &Expression,
    ) -> Result<(Vec<(String, AstAccumulator)>, Serializer)> {
        let members = match selector {
            Expression::New { members } => members,
            _ => {
                return Err(self
                    .call
                    .unsupported("a group result must construct an object"))
            }
        };
        let mut fields = Vec::with_capacity(members.len());
        let mut document = DocumentSerializer::new("AnonymousType");
        for (name, value) in members {
            let (accumulator, serializer) = self.accumulator(value)?;
            fields.push((name.clone(), accumulator));
            document = document.member(name.clone(), serializer);
        }
        Ok((fields, document.into()))
    }

    fn is_grouping(&self, expression: &Expression) -> bool {
        matches!(expression, Expression::Parameter(name) if name == self.grouping_parameter)
    }

    fn is_key(&self, expression: &Expression) -> bool {
        match expression {
            Expression::Parameter(name) => Some(name.as_str()) == self.key_parameter,
            Expression::Member { expression, name } => name == "Key" && self.is_grouping(expression),
            _ => false,
        }
    }

    /// A context in which `parameter` is one of the grouped documents.
    fn element_context(&self, parameter: &str) -> TranslationContext {
        TranslationContext::default().with_symbol(
            parameter,
            self.element.ast.clone(),
            self.element.serializer.clone(),
        )
    }

    fn accumulator(&self, value: &Expression) -> Result<(AstAccumulator, Serializer)> {
        if self.is_key(value) {
            return Ok((
                AstAccumulator::new(AstAccumulatorOperator::First, self.key.clone()),
                self.key_serializer.clone(),
            ));
        }
        if let Some(accumulation) = self.first_or_last(value)? {
            return Ok(accumulation);
        }

        let (method, arguments) = match value {
            Expression::Call {
                method: Method::Sequence(method),
                arguments,
            } if arguments.first().is_some_and(|source| self.is_grouping(source)) => {
                (*method, &arguments[1..])
            }
            _ => {
                return Err(self.call.unsupported(format!(
                    "{value} cannot be computed by a $group accumulator"
                )))
            }
        };

        match (method, arguments) {
            (SequenceMethod::Count, []) => Ok((
                AstAccumulator::new(AstAccumulatorOperator::Sum, AstExpression::Constant(Bson::Int32(1))),
                Serializer::value(ValueKind::Int32),
            )),
            (SequenceMethod::LongCount, []) => Ok((
                AstAccumulator::new(AstAccumulatorOperator::Sum, AstExpression::Constant(Bson::Int32(1))),
                Serializer::value(ValueKind::Int64),
            )),
            (
                SequenceMethod::Sum
                | SequenceMethod::Min
                | SequenceMethod::Max
                | SequenceMethod::Average,
                [] | [_],
            ) => {
                let values = match arguments.first() {
                    Some(selector) => {
                        let (parameters, body) = selector
                            .as_lambda()
                            .filter(|(parameters, _)| parameters.len() == 1)
                            .ok_or_else(|| {
                                self.call
                                    .unsupported("the selector is not a lambda of one parameter")
                            })?;
                        expression::translate(&self.element_context(&parameters[0]), body)?
                    }
                    None => expression::translate(
                        &self.element_context(self.grouping_parameter),
                        &Expression::parameter(self.grouping_parameter),
                    )?,
                };
                let operator = match method {
                    SequenceMethod::Sum => AstAccumulatorOperator::Sum,
                    SequenceMethod::Min => AstAccumulatorOperator::Min,
                    SequenceMethod::Max => AstAccumulatorOperator::Max,
                    _ => AstAccumulatorOperator::Avg,
                };
                let serializer = match method {
                    SequenceMethod::Average => Serializer::value(ValueKind::Double),
                    _ => values.serializer,
                };
                Ok((AstAccumulator::new(operator, values.ast), serializer))
            }
            _ => Err(self.call.unsupported(format!(
                "{value} cannot be computed by a $group accumulator"
            ))),
        }
    }

    /// `g.First()` or `g.Last()`, possibly followed by member accesses.
    fn first_or_last(&self, value: &Expression) -> Result<Option<(AstAccumulator, Serializer)>> {
        let mut names = Vec::new();
        let mut current = value;
        while let Expression::Member { expression, name } = current {
            names.push(name.as_str());
            current = expression;
        }
        let operator = match current {
            Expression::Call {
                method: Method::Sequence(method @ (SequenceMethod::First | SequenceMethod::Last)),
                arguments,
            } if arguments.len() == 1 && self.is_grouping(&arguments[0]) => match method {
                SequenceMethod::First => AstAccumulatorOperator::First,
                _ => AstAccumulatorOperator::Last,
            },
            _ => return Ok(None),
        };

        const ELEMENT: &str = "element";
        let rebased = names
            .into_iter()
            .rev()
            .fold(Expression::parameter(ELEMENT), |expression, name| {
                Expression::member(expression, name)
            });
        let translation = expression::translate(&self.element_context(ELEMENT), &rebased)?;
        Ok(Some((
            AstAccumulator::new(operator, translation.ast),
            translation.serializer,
        )))
    }
}
