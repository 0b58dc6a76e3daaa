mod distinct;
mod expression;
mod group_by;
mod of_type;
mod order_by;
mod pipeline;
mod pipeline_translator;
mod select;
mod select_many;
mod skip_take;
mod where_stage;


pub use self::{
    expression::ExpressionTranslation,
    pipeline::TranslatedPipeline,
    pipeline_translator::PipelineTranslator,
};
use crate::linq::{Expression, QueryMethod, UnsupportedExpressionError};

type Result<T> = std::result::Result<T, UnsupportedExpressionError>;

/// A call of a query method, with its first argument already translated into the upstream
/// pipeline.
#[derive(Debug)]
pub(crate) struct QueryCall<'a> {
    pub(crate) expression: &'a Expression,
    pub(crate) method: QueryMethod,
    pub(crate) arguments: &'a [Expression],
}

impl<'a> QueryCall<'a> {
    pub(crate) fn unsupported(&self, reason: impl Into<String>) -> UnsupportedExpressionError {
        UnsupportedExpressionError::new(self.expression, reason)
    }

    /// Checks the number of arguments, counting the source.
    pub(crate) fn expect_arguments(&self, counts: &[usize]) -> Result<()> {
        if counts.contains(&self.arguments.len()) {
            Ok(())
        } else {
            Err(self.unsupported(format!(
                "{} does not take {} arguments",
                self.method,
                self.arguments.len()
            )))
        }
    }

    pub(crate) fn argument(&self, index: usize) -> Result<&'a Expression> {
        self.arguments
            .get(index)
            .ok_or_else(|| self.unsupported(format!("argument {index} is missing")))
    }

    /// The argument at `index` as a lambda taking `parameter_count` parameters.
    pub(crate) fn lambda(
        &self,
        index: usize,
        parameter_count: usize,
    ) -> Result<(&'a [String], &'a Expression)> {
        match self.argument(index)?.as_lambda() {
            Some((parameters, body)) if parameters.len() == parameter_count => {
                Ok((parameters, body))
            }
            _ => Err(self.unsupported(format!(
                "argument {index} is not a lambda of {parameter_count} parameters"
            ))),
        }
    }
}

/// Adds the stages of one query method to the pipeline translated so far.
pub(crate) trait StageTranslator: Sync {
    fn translate(
        &self,
        pipeline: TranslatedPipeline,
        call: &QueryCall<'_>,
    ) -> Result<TranslatedPipeline>;
}
