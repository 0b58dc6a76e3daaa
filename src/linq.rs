//! Translation of LINQ-style query expressions into aggregation pipelines.
//!
//! A query is an [`Expression`] tree: a chain of [`QueryMethod`] calls on top of an
//! [`Expression::Queryable`] that names the collection's document [`Serializer`]. The
//! [`PipelineTranslator`] walks the chain from the collection outwards and lets one stage
//! translator per method append stages to a [`TranslatedPipeline`]. Each stage translator also
//! records the serializer of the documents its stages output, which is how later methods know
//! what a member access refers to.
//!
//! Query shapes that have no pipeline equivalent fail with an [`UnsupportedExpressionError`]
//! naming the offending sub-expression.

pub mod ast;
mod expression;
mod serializer;
mod translators;

use thiserror::Error;

pub use self::{
    expression::{BinaryOperator, Expression, Method, QueryMethod, SequenceMethod},
    serializer::{DocumentSerializer, MemberSerializer, Serializer, ValueKind},
    translators::{ExpressionTranslation, PipelineTranslator, TranslatedPipeline},
};

/// A query expression that cannot be expressed as an aggregation pipeline.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("Expression not supported: {expression} because {reason}")]
#[non_exhaustive]
pub struct UnsupportedExpressionError {
    /// The sub-expression that could not be translated.
    pub expression: Expression,

    /// Why it could not be translated.
    pub reason: String,
}

impl UnsupportedExpressionError {
    pub(crate) fn new(expression: &Expression, reason: impl Into<String>) -> Self {
        Self {
            expression: expression.clone(),
            reason: reason.into(),
        }
    }
}
