use crate::{
    cmap::StreamDescription,
    error::{Error, ErrorKind, Result},
    operation::{
        retryable::{
            retryability::{
                add_retryable_write_error_label_if_required,
                is_reportable_second_attempt_error,
                is_retryable_read_error,
                is_retryable_write_error,
            },
            RetryableReadContext,
            RetryableReadOperation,
            RetryableWriteContext,
            RetryableWriteOperation,
        },
        Retryability,
    },
    sdam::ServerAddress,
    trace::{TracingRepresentation, RETRY_TRACING_EVENT_TARGET},
};

/// What the second attempt needs to know about the first one.
#[derive(Debug)]
struct ExecutionRetry {
    first_error: Error,
    first_server: ServerAddress,
}

impl ExecutionRetry {
    /// Picks the error reported when the second attempt failed as well.
    ///
    /// A server or driver error from the second attempt is dropped in favor of the original one,
    /// even though it may be more specific. Network and client-side errors are reported as is.
    fn select_error(self, second_error: Error) -> Error {
        select_error(self.first_error, second_error)
    }
}

pub(crate) fn select_error(first_error: Error, second_error: Error) -> Error {
    if is_reportable_second_attempt_error(&second_error) {
        second_error
    } else {
        first_error
    }
}

/// Runs read operations with at most one retry.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct RetryableReadOperationExecutor;

impl RetryableReadOperationExecutor {
    /// Executes `operation` on the context's channel, retrying once on a fresh channel after a
    /// retryable error when the context allows it.
    pub async fn execute<Op>(
        operation: &mut Op,
        context: &mut RetryableReadContext<'_>,
    ) -> Result<Op::O>
    where
        Op: RetryableReadOperation + ?Sized,
    {
        context.check_cancelled()?;
        let first_error = match operation.execute_attempt(context, 1, None).await {
            Ok(output) => return Ok(output),
            Err(error) => error,
        };

        if !Self::should_retry(operation, context, &first_error) {
            return Err(first_error);
        }
        let retry = ExecutionRetry {
            first_server: context.channel_source().server_address().clone(),
            first_error,
        };
        trace_retry(&retry);

        if let Err(error) = context
            .acquire_or_replace_channel(std::slice::from_ref(&retry.first_server))
            .await
        {
            trace_acquisition_failure(&error);
            return Err(retry.first_error);
        }

        match operation.execute_attempt(context, 2, None).await {
            Ok(output) => Ok(output),
            Err(second_error) => Err(retry.select_error(second_error)),
        }
    }

    fn should_retry<Op>(operation: &Op, context: &RetryableReadContext<'_>, error: &Error) -> bool
    where
        Op: RetryableReadOperation + ?Sized,
    {
        operation.retryability() != Retryability::None
            && context.retry_requested()
            && !context.session().in_transaction()
            && is_retryable_read_error(error)
    }
}

/// Runs write operations with at most one retry.
#[derive(Debug, Clone, Copy, Default)]
#[non_exhaustive]
pub struct RetryableWriteOperationExecutor;

impl RetryableWriteOperationExecutor {
    /// Executes `operation` on the context's channel. When the write is retryable, a transaction
    /// number is assigned once and shared by both attempts.
    pub async fn execute<Op>(
        operation: &mut Op,
        context: &mut RetryableWriteContext<'_>,
    ) -> Result<Op::O>
    where
        Op: RetryableWriteOperation + ?Sized,
    {
        context.check_cancelled()?;
        let first_description = context.description().clone();
        let transaction_number = if Self::is_operation_retryable(operation, context) {
            Some(context.session_mut().advance_transaction_number())
        } else {
            None
        };

        let mut first_error = match operation
            .execute_attempt(context, 1, transaction_number)
            .await
        {
            Ok(output) => return Ok(output),
            Err(error) => error,
        };
        if transaction_number.is_none() {
            return Err(first_error);
        }

        add_retryable_write_error_label_if_required(&mut first_error, &first_description);
        if !is_retryable_write_error(&first_error) {
            return Err(rewrite_unsupported_retryable_write(first_error));
        }
        let retry = ExecutionRetry {
            first_server: context.channel_source().server_address().clone(),
            first_error,
        };
        trace_retry(&retry);

        if let Err(error) = context
            .acquire_or_replace_channel(std::slice::from_ref(&retry.first_server))
            .await
        {
            trace_acquisition_failure(&error);
            return Err(retry.first_error);
        }
        if !context.description().supports_retryable_writes() {
            tracing::debug!(
                target: RETRY_TRACING_EVENT_TARGET,
                "Replacement server does not support retryable writes"
            );
            return Err(retry.first_error);
        }

        match operation
            .execute_attempt(context, 2, transaction_number)
            .await
        {
            Ok(output) => Ok(output),
            Err(second_error) => Err(retry.select_error(second_error)),
        }
    }

    fn is_operation_retryable<Op>(operation: &Op, context: &RetryableWriteContext<'_>) -> bool
    where
        Op: RetryableWriteOperation + ?Sized,
    {
        operation.retryability() == Retryability::Write
            && operation.is_acknowledged()
            && context.retry_requested()
            && context.session().id().is_some()
            && !context.session().in_transaction()
            && are_retryable_writes_supported(context.description())
    }
}

fn are_retryable_writes_supported(description: &StreamDescription) -> bool {
    description.supports_retryable_writes()
}

/// Servers whose storage engine cannot do retryable writes reject transaction numbers with code
/// 20 and a message that does not say how to avoid the problem.
fn rewrite_unsupported_retryable_write(mut error: Error) -> Error {
    if let ErrorKind::Command(ref mut command_error) = *error.kind {
        if command_error.code == 20 && command_error.message.starts_with("Transaction numbers") {
            command_error.message = "This deployment does not support retryable writes. Disable \
                                     write retries for this operation."
                .to_string();
        }
    }
    error
}

fn trace_retry(retry: &ExecutionRetry) {
    tracing::debug!(
        target: RETRY_TRACING_EVENT_TARGET,
        error = retry.first_error.tracing_representation(),
        serverHost = retry.first_server.host.as_str(),
        serverPort = retry.first_server.port_or_default(),
        "Retrying operation"
    );
}

fn trace_acquisition_failure(error: &Error) {
    tracing::debug!(
        target: RETRY_TRACING_EVENT_TARGET,
        error = error.tracing_representation(),
        "Could not acquire a channel for the retry attempt"
    );
}
