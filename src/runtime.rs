use std::future::Future;

use tokio::task::JoinHandle;

/// Spawn a task in the background to run a future.
///
/// Returns `None` when called outside of a tokio runtime, in which case the future is dropped
/// without running.
pub(crate) fn spawn<F, O>(fut: F) -> Option<JoinHandle<O>>
where
    F: Future<Output = O> + Send + 'static,
    O: Send + 'static,
{
    #[cfg(feature = "sync")]
    {
        let handle = tokio::runtime::Handle::try_current()
            .unwrap_or_else(|_| crate::sync::TOKIO_RUNTIME.handle().clone());
        Some(handle.spawn(fut))
    }

    #[cfg(not(feature = "sync"))]
    {
        tokio::runtime::Handle::try_current()
            .ok()
            .map(|handle| handle.spawn(fut))
    }
}

/// Runs a future to completion on the runtime backing the blocking API.
///
/// Must not be called from inside an async context.
#[cfg(feature = "sync")]
pub(crate) fn block_on<F, T>(fut: F) -> T
where
    F: Future<Output = T>,
{
    crate::sync::TOKIO_RUNTIME.block_on(fut)
}
