//! Retry-once execution of operations.
//!
//! An operation runs its first attempt on the channel held by its context. If that fails with an
//! error that is retryable for the kind of operation, and retries are allowed, the context
//! acquires a fresh channel on a different server when possible and the operation runs a second
//! and last attempt. Which of the two errors is surfaced when both attempts fail is decided by
//! [`executor::select_error`].

pub(crate) mod context;
pub(crate) mod executor;
pub(crate) mod retryability;

#[cfg(test)]
mod test;

pub use self::{
    context::{RetryableReadContext, RetryableWriteContext},
    executor::{RetryableReadOperationExecutor, RetryableWriteOperationExecutor},
};
use crate::{
    error::Result,
    operation::{execute_on_channel, Operation, Retryability},
    BoxFuture,
};

/// An operation that can be run through [`RetryableReadOperationExecutor`].
pub trait RetryableReadOperation: Send {
    /// The output type of this operation.
    type O: Send;

    /// Runs one attempt on the context's current channel. `attempt` starts at 1.
    fn execute_attempt<'a>(
        &'a mut self,
        context: &'a mut RetryableReadContext<'_>,
        attempt: u32,
        transaction_number: Option<i64>,
    ) -> BoxFuture<'a, Result<Self::O>>;

    /// The level of retryability the operation supports.
    fn retryability(&self) -> Retryability;
}

/// An operation that can be run through [`RetryableWriteOperationExecutor`].
pub trait RetryableWriteOperation: Send {
    /// The output type of this operation.
    type O: Send;

    /// Runs one attempt on the context's current channel. Both attempts of one logical write
    /// share `transaction_number`.
    fn execute_attempt<'a>(
        &'a mut self,
        context: &'a mut RetryableWriteContext<'_>,
        attempt: u32,
        transaction_number: Option<i64>,
    ) -> BoxFuture<'a, Result<Self::O>>;

    /// Whether the server will acknowledge the write.
    fn is_acknowledged(&self) -> bool;

    /// The level of retryability the operation supports.
    fn retryability(&self) -> Retryability;
}

impl<T> RetryableReadOperation for T
where
    T: Operation + Send,
    T::O: Send,
{
    type O = T::O;

    fn execute_attempt<'a>(
        &'a mut self,
        context: &'a mut RetryableReadContext<'_>,
        attempt: u32,
        transaction_number: Option<i64>,
    ) -> BoxFuture<'a, Result<Self::O>> {
        Box::pin(async move {
            if attempt > 1 {
                self.update_for_retry();
            }
            let (channel, session) = context.channel_and_session();
            execute_on_channel(self, channel, session, transaction_number).await
        })
    }

    fn retryability(&self) -> Retryability {
        Operation::retryability(self)
    }
}

impl<T> RetryableWriteOperation for T
where
    T: Operation + Send,
    T::O: Send,
{
    type O = T::O;

    fn execute_attempt<'a>(
        &'a mut self,
        context: &'a mut RetryableWriteContext<'_>,
        attempt: u32,
        transaction_number: Option<i64>,
    ) -> BoxFuture<'a, Result<Self::O>> {
        Box::pin(async move {
            if attempt > 1 {
                self.update_for_retry();
            }
            let (channel, session) = context.channel_and_session();
            execute_on_channel(self, channel, session, transaction_number).await
        })
    }

    fn is_acknowledged(&self) -> bool {
        Operation::is_acknowledged(self)
    }

    fn retryability(&self) -> Retryability {
        Operation::retryability(self)
    }
}
