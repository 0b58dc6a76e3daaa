//! The query expression tree that the translator consumes.

use std::fmt;

use crate::{bson::Bson, linq::Serializer};

/// The query operators that become pipeline stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum QueryMethod {
    Where,
    Select,
    GroupBy,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    SelectMany,
    Distinct,
    OfType,
    Skip,
    Take,
}

/// Methods applied to a sequence held inside a document, such as the elements of a group or an
/// array field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum SequenceMethod {
    Count,
    LongCount,
    Min,
    Max,
    Sum,
    Average,
    First,
    Last,
    Contains,
}

/// The method of a [`Expression::Call`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display, derive_more::From)]
pub enum Method {
    #[display("{_0}")]
    Query(QueryMethod),
    #[display("{_0}")]
    Sequence(SequenceMethod),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum BinaryOperator {
    #[display("==")]
    Equal,
    #[display("!=")]
    NotEqual,
    #[display(">")]
    GreaterThan,
    #[display(">=")]
    GreaterThanOrEqual,
    #[display("<")]
    LessThan,
    #[display("<=")]
    LessThanOrEqual,
    #[display("&&")]
    AndAlso,
    #[display("||")]
    OrElse,
    #[display("+")]
    Add,
    #[display("-")]
    Subtract,
    #[display("*")]
    Multiply,
    #[display("/")]
    Divide,
    #[display("%")]
    Modulo,
}

impl BinaryOperator {
    pub(crate) fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
                | Self::LessThan
                | Self::LessThanOrEqual
        )
    }

    /// The operator to use when the operands trade places, e.g. `18 <= p.age` as `p.age >= 18`.
    pub(crate) fn flipped(self) -> Self {
        match self {
            Self::GreaterThan => Self::LessThan,
            Self::GreaterThanOrEqual => Self::LessThanOrEqual,
            Self::LessThan => Self::GreaterThan,
            Self::LessThanOrEqual => Self::GreaterThanOrEqual,
            other => other,
        }
    }
}

/// A node of a query expression.
///
/// A query is a chain of [`Expression::Call`]s of [`QueryMethod`]s whose first argument is the
/// upstream query, ending in an [`Expression::Queryable`] that stands for the collection. The
/// other arguments are usually [`Expression::Lambda`]s over the documents flowing through the
/// pipeline at that point.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum Expression {
    /// The collection a query starts from, with the shape of its documents.
    Queryable(Serializer),
    Constant(Bson),
    /// A reference to a lambda parameter.
    Parameter(String),
    /// Access to a member of the value of `expression`.
    Member {
        expression: Box<Expression>,
        name: String,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Not(Box<Expression>),
    Lambda {
        parameters: Vec<String>,
        body: Box<Expression>,
    },
    Call {
        method: Method,
        arguments: Vec<Expression>,
    },
    /// Construction of an object from named members.
    New {
        members: Vec<(String, Expression)>,
    },
    /// A type named as a method argument, as in `OfType<Dog>()`.
    TypeName(String),
}

#[allow(missing_docs)]
impl Expression {
    pub fn queryable(serializer: impl Into<Serializer>) -> Self {
        Self::Queryable(serializer.into())
    }

    pub fn constant(value: impl Into<Bson>) -> Self {
        Self::Constant(value.into())
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Self::Parameter(name.into())
    }

    pub fn member(expression: impl Into<Expression>, name: impl Into<String>) -> Self {
        Self::Member {
            expression: Box::new(expression.into()),
            name: name.into(),
        }
    }

    pub fn lambda<S: Into<String>>(
        parameters: impl IntoIterator<Item = S>,
        body: impl Into<Expression>,
    ) -> Self {
        Self::Lambda {
            parameters: parameters.into_iter().map(Into::into).collect(),
            body: Box::new(body.into()),
        }
    }

    pub fn call(method: impl Into<Method>, arguments: Vec<Expression>) -> Self {
        Self::Call {
            method: method.into(),
            arguments,
        }
    }

    pub fn new_object<S: Into<String>>(members: impl IntoIterator<Item = (S, Expression)>) -> Self {
        Self::New {
            members: members
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }

    pub fn type_name(name: impl Into<String>) -> Self {
        Self::TypeName(name.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(operand: impl Into<Expression>) -> Self {
        Self::Not(Box::new(operand.into()))
    }

    pub fn binary(
        operator: BinaryOperator,
        left: impl Into<Expression>,
        right: impl Into<Expression>,
    ) -> Self {
        Self::Binary {
            operator,
            left: Box::new(left.into()),
            right: Box::new(right.into()),
        }
    }

    pub fn eq(left: impl Into<Expression>, right: impl Into<Expression>) -> Self {
        Self::binary(BinaryOperator::Equal, left, right)
    }

    pub fn ne(left: impl Into<Expression>, right: impl Into<Expression>) -> Self {
        Self::binary(BinaryOperator::NotEqual, left, right)
    }

    pub fn gt(left: impl Into<Expression>, right: impl Into<Expression>) -> Self {
        Self::binary(BinaryOperator::GreaterThan, left, right)
    }

    pub fn gte(left: impl Into<Expression>, right: impl Into<Expression>) -> Self {
        Self::binary(BinaryOperator::GreaterThanOrEqual, left, right)
    }

    pub fn lt(left: impl Into<Expression>, right: impl Into<Expression>) -> Self {
        Self::binary(BinaryOperator::LessThan, left, right)
    }

    pub fn lte(left: impl Into<Expression>, right: impl Into<Expression>) -> Self {
        Self::binary(BinaryOperator::LessThanOrEqual, left, right)
    }

    pub fn and(left: impl Into<Expression>, right: impl Into<Expression>) -> Self {
        Self::binary(BinaryOperator::AndAlso, left, right)
    }

    pub fn or(left: impl Into<Expression>, right: impl Into<Expression>) -> Self {
        Self::binary(BinaryOperator::OrElse, left, right)
    }

    /// The parameters and body of a lambda.
    pub(crate) fn as_lambda(&self) -> Option<(&[String], &Expression)> {
        match self {
            Self::Lambda { parameters, body } => Some((parameters, body)),
            _ => None,
        }
    }
}

macro_rules! constant_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Expression {
                fn from(value: $t) -> Self {
                    Self::Constant(value.into())
                }
            }
        )*
    };
}

constant_from!(i32, i64, f64, bool, &str, String, Bson);

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queryable(serializer) => write!(f, "Queryable<{}>", serializer.type_name()),
            Self::Constant(value) => write!(f, "{value}"),
            Self::Parameter(name) | Self::TypeName(name) => f.write_str(name),
            Self::Member { expression, name } => write!(f, "{expression}.{name}"),
            Self::Binary {
                operator,
                left,
                right,
            } => write!(f, "({left} {operator} {right})"),
            Self::Not(operand) => write!(f, "!{operand}"),
            Self::Lambda { parameters, body } => match parameters.as_slice() {
                [parameter] => write!(f, "{parameter} => {body}"),
                parameters => write!(f, "({}) => {body}", parameters.join(", ")),
            },
            Self::Call { method, arguments } => {
                let (target, rest) = match arguments.split_first() {
                    Some((target, rest)) => (target.to_string(), rest),
                    None => (String::new(), &[][..]),
                };
                let rest: Vec<String> = rest.iter().map(ToString::to_string).collect();
                write!(f, "{target}.{method}({})", rest.join(", "))
            }
            Self::New { members } => {
                let members: Vec<String> = members
                    .iter()
                    .map(|(name, value)| format!("{name} = {value}"))
                    .collect();
                write!(f, "new {{ {} }}", members.join(", "))
            }
        }
    }
}
