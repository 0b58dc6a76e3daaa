//! Blocking versions of the async entry points. This is only available when the `sync` feature
//! is enabled.
//!
//! Every blocking call drives the corresponding future to completion on a runtime owned by the
//! crate, so none of them may be called from inside an async context.

mod cursor;


use std::sync::LazyLock;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

pub use self::cursor::Cursor;
use crate::{
    binding::{ReadBinding, WriteBinding},
    error::Result,
    operation::{AggregateOperation, BulkMixedWriteOperation},
    options::RetrySettings,
    results::BulkWriteOperationResult,
    runtime,
    session::ClientSession,
};

pub(crate) static TOKIO_RUNTIME: LazyLock<tokio::runtime::Runtime> =
    LazyLock::new(|| match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => panic!("Error occurred when starting the underlying async runtime: {err}"),
    });

impl<T> AggregateOperation<T>
where
    T: DeserializeOwned + Send,
{
    /// Blocking version of [`AggregateOperation::execute`].
    pub fn run(
        &mut self,
        binding: &dyn ReadBinding,
        session: &mut ClientSession,
        retry_settings: RetrySettings,
        cancellation_token: CancellationToken,
    ) -> Result<Cursor<T>> {
        runtime::block_on(self.execute(binding, session, retry_settings, cancellation_token))
            .map(Cursor::new)
    }
}

impl BulkMixedWriteOperation {
    /// Blocking version of [`BulkMixedWriteOperation::execute`].
    pub fn run(
        &self,
        binding: &dyn WriteBinding,
        session: &mut ClientSession,
        retry_settings: RetrySettings,
        cancellation_token: CancellationToken,
    ) -> Result<BulkWriteOperationResult> {
        runtime::block_on(self.execute(binding, session, retry_settings, cancellation_token))
    }
}
