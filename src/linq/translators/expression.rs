use crate::linq::{
    ast::{AstExpression, AstOperator},
    translators::Result,
    BinaryOperator,
    DocumentSerializer,
    Expression,
    Method,
    SequenceMethod,
    Serializer,
    UnsupportedExpressionError,
    ValueKind,
};

/// An expression translated into an aggregation expression, with the serializer of its value.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpressionTranslation {
    pub ast: AstExpression,
    pub serializer: Serializer,
}

impl ExpressionTranslation {
    fn new(ast: AstExpression, serializer: Serializer) -> Self {
        Self { ast, serializer }
    }
}

#[derive(Clone, Debug)]
struct Symbol {
    name: String,
    ast: AstExpression,
    serializer: Serializer,
}

/// The lambda parameters in scope and what each stands for.
#[derive(Clone, Debug, Default)]
pub(crate) struct TranslationContext {
    symbols: Vec<Symbol>,
}

impl TranslationContext {
    /// A context in which `parameter` is the current document of a pipeline whose documents are
    /// described by `serializer`.
    pub(crate) fn for_documents(parameter: &str, serializer: &Serializer) -> Self {
        Self::default().with_document(parameter, serializer)
    }

    pub(crate) fn with_document(&self, parameter: &str, serializer: &Serializer) -> Self {
        let (ast, serializer) = match serializer {
            Serializer::Wrapped(inner) => (AstExpression::field("_v"), (**inner).clone()),
            other => (AstExpression::root(), other.clone()),
        };
        self.with_symbol(parameter, ast, serializer)
    }

    pub(crate) fn with_symbol(
        &self,
        name: &str,
        ast: AstExpression,
        serializer: Serializer,
    ) -> Self {
        let mut context = self.clone();
        context.symbols.push(Symbol {
            name: name.to_string(),
            ast,
            serializer,
        });
        context
    }

    fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().rev().find(|symbol| symbol.name == name)
    }
}

/// Translates `expression` into an aggregation expression evaluated against the documents the
/// context describes.
pub(crate) fn translate(
    context: &TranslationContext,
    expression: &Expression,
) -> Result<ExpressionTranslation> {
    match expression {
        Expression::Constant(value) => Ok(ExpressionTranslation::new(
            AstExpression::Constant(value.clone()),
            Serializer::for_value(value),
        )),
        Expression::Parameter(name) => context
            .lookup(name)
            .map(|symbol| ExpressionTranslation::new(symbol.ast.clone(), symbol.serializer.clone()))
            .ok_or_else(|| {
                UnsupportedExpressionError::new(expression, format!("{name} is not in scope"))
            }),
        Expression::Member {
            expression: target,
            name,
        } => {
            let target = translate(context, target)?;
            translate_member(expression, target, name)
        }
        Expression::Binary {
            operator,
            left,
            right,
        } => {
            let left = translate(context, left)?;
            let right = translate(context, right)?;
            let boolean = Serializer::value(ValueKind::Boolean);
            let (ast_operator, serializer) = match operator {
                BinaryOperator::Equal => (AstOperator::Eq, boolean),
                BinaryOperator::NotEqual => (AstOperator::Ne, boolean),
                BinaryOperator::GreaterThan => (AstOperator::Gt, boolean),
                BinaryOperator::GreaterThanOrEqual => (AstOperator::Gte, boolean),
                BinaryOperator::LessThan => (AstOperator::Lt, boolean),
                BinaryOperator::LessThanOrEqual => (AstOperator::Lte, boolean),
                BinaryOperator::AndAlso => (AstOperator::And, boolean),
                BinaryOperator::OrElse => (AstOperator::Or, boolean),
                BinaryOperator::Divide => (AstOperator::Divide, Serializer::value(ValueKind::Double)),
                BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Modulo => {
                    let ast_operator = match operator {
                        BinaryOperator::Add => AstOperator::Add,
                        BinaryOperator::Subtract => AstOperator::Subtract,
                        BinaryOperator::Multiply => AstOperator::Multiply,
                        _ => AstOperator::Mod,
                    };
                    (
                        ast_operator,
                        Serializer::numeric_result(&left.serializer, &right.serializer),
                    )
                }
            };
            Ok(ExpressionTranslation::new(
                AstExpression::operator(ast_operator, vec![left.ast, right.ast]),
                serializer,
            ))
        }
        Expression::Not(operand) => {
            let operand = translate(context, operand)?;
            Ok(ExpressionTranslation::new(
                AstExpression::operator(AstOperator::Not, vec![operand.ast]),
                Serializer::value(ValueKind::Boolean),
            ))
        }
        Expression::Call {
            method: Method::Sequence(method),
            arguments,
        } => translate_sequence_call(context, expression, *method, arguments),
        Expression::New { members } => {
            let mut fields = Vec::with_capacity(members.len());
            let mut document = DocumentSerializer::new("AnonymousType");
            for (name, value) in members {
                let value = translate(context, value)?;
                fields.push((name.clone(), value.ast));
                document = document.member(name.clone(), value.serializer);
            }
            Ok(ExpressionTranslation::new(
                AstExpression::ComputedDocument(fields),
                document.into(),
            ))
        }
        _ => Err(UnsupportedExpressionError::new(
            expression,
            "it has no aggregation expression equivalent",
        )),
    }
}

fn translate_member(
    expression: &Expression,
    target: ExpressionTranslation,
    name: &str,
) -> Result<ExpressionTranslation> {
    let unsupported = |reason: String| UnsupportedExpressionError::new(expression, reason);
    let (element_name, serializer) = match &target.serializer {
        Serializer::Document(document) => {
            let member = document.lookup_member(name).ok_or_else(|| {
                unsupported(format!("{} has no member {name}", document.type_name()))
            })?;
            (member.element_name.clone(), member.serializer.clone())
        }
        Serializer::Grouping { key, .. } if name == "Key" => ("_id".to_string(), (**key).clone()),
        Serializer::Array(_) if name == "Length" || name == "Count" => {
            return Ok(ExpressionTranslation::new(
                AstExpression::operator(AstOperator::Size, vec![target.ast]),
                Serializer::value(ValueKind::Int32),
            ));
        }
        Serializer::Value(ValueKind::Any) => (name.to_string(), Serializer::any()),
        other => {
            return Err(unsupported(format!(
                "{} has no member {name}",
                other.type_name()
            )))
        }
    };
    let ast = target
        .ast
        .sub_field(&element_name)
        .ok_or_else(|| unsupported(format!("{name} is a member of a computed value")))?;
    Ok(ExpressionTranslation::new(ast, serializer))
}

/// The items of a sequence: the grouped documents of a grouping or the elements of an array.
pub(crate) fn sequence_items(source: &ExpressionTranslation) -> Option<ExpressionTranslation> {
    match &source.serializer {
        Serializer::Grouping { element, .. } => Some(ExpressionTranslation::new(
            source.ast.sub_field("_elements")?,
            (**element).clone(),
        )),
        Serializer::Array(item) => Some(ExpressionTranslation::new(
            source.ast.clone(),
            (**item).clone(),
        )),
        Serializer::Value(ValueKind::Any) => Some(source.clone()),
        _ => None,
    }
}

fn translate_sequence_call(
    context: &TranslationContext,
    expression: &Expression,
    method: SequenceMethod,
    arguments: &[Expression],
) -> Result<ExpressionTranslation> {
    let unsupported = |reason: String| UnsupportedExpressionError::new(expression, reason);
    let (source, rest) = arguments
        .split_first()
        .ok_or_else(|| unsupported(format!("{method} has no source")))?;
    let source = translate(context, source)?;
    let items = sequence_items(&source)
        .ok_or_else(|| unsupported(format!("{} is not a sequence", source.serializer.type_name())))?;

    let (ast_operator, serializer) = match (method, rest) {
        (SequenceMethod::Count, []) => (AstOperator::Size, Serializer::value(ValueKind::Int32)),
        (SequenceMethod::LongCount, []) => {
            (AstOperator::Size, Serializer::value(ValueKind::Int64))
        }
        (SequenceMethod::First, []) => (AstOperator::First, items.serializer.clone()),
        (SequenceMethod::Last, []) => (AstOperator::Last, items.serializer.clone()),
        (SequenceMethod::Contains, [value]) => {
            let value = translate(context, value)?;
            return Ok(ExpressionTranslation::new(
                AstExpression::operator(AstOperator::In, vec![value.ast, items.ast]),
                Serializer::value(ValueKind::Boolean),
            ));
        }
        (
            SequenceMethod::Sum
            | SequenceMethod::Min
            | SequenceMethod::Max
            | SequenceMethod::Average,
            [] | [_],
        ) => {
            let values = match rest.first() {
                Some(selector) => map_items(context, expression, items, selector)?,
                None => items,
            };
            let ast_operator = match method {
                SequenceMethod::Sum => AstOperator::Sum,
                SequenceMethod::Min => AstOperator::Min,
                SequenceMethod::Max => AstOperator::Max,
                _ => AstOperator::Avg,
            };
            let serializer = match method {
                SequenceMethod::Average => Serializer::value(ValueKind::Double),
                _ => values.serializer,
            };
            return Ok(ExpressionTranslation::new(
                AstExpression::operator(ast_operator, vec![values.ast]),
                serializer,
            ));
        }
        _ => {
            return Err(unsupported(format!(
                "{method} with {} arguments is not supported",
                rest.len()
            )))
        }
    };
    Ok(ExpressionTranslation::new(
        AstExpression::operator(ast_operator, vec![items.ast]),
        serializer,
    ))
}

/// Applies a one parameter `selector` lambda to every item with `$map`.
fn map_items(
    context: &TranslationContext,
    expression: &Expression,
    items: ExpressionTranslation,
    selector: &Expression,
) -> Result<ExpressionTranslation> {
    let (parameter, body) = match selector.as_lambda() {
        Some(([parameter], body)) => (parameter, body),
        _ => {
            return Err(UnsupportedExpressionError::new(
                expression,
                "the selector is not a lambda of one parameter",
            ))
        }
    };
    let item_context = context.with_symbol(
        parameter,
        AstExpression::Variable(parameter.clone()),
        items.serializer,
    );
    let body = translate(&item_context, body)?;
    Ok(ExpressionTranslation::new(
        AstExpression::Map {
            input: Box::new(items.ast),
            variable: parameter.clone(),
            body: Box::new(body.ast),
        },
        body.serializer,
    ))
}
