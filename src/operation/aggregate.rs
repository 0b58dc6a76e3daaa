//! Aggregations returning a cursor.

#[cfg(test)]
mod test;

use std::marker::PhantomData;

use derive_where::derive_where;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::{
    binding::ReadBinding,
    bson::{doc, Bson, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    cursor::AsyncCursor,
    error::{Error, Result},
    operation::{
        CursorBody,
        CursorInfo,
        OperationWithDefaults,
        Retryability,
        RetryableReadContext,
        RetryableReadOperation,
        RetryableReadOperationExecutor,
    },
    options::{append_options, AggregateOptions, CursorOptions, RetrySettings},
    serde_util,
    session::ClientSession,
    BoxFuture,
    Namespace,
};

/// What an aggregation runs against.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum AggregateTarget {
    /// A database-level aggregation, e.g. one starting with `$currentOp`.
    Database(String),
    /// An aggregation over the documents of a collection.
    Collection(Namespace),
}

impl AggregateTarget {
    fn to_bson(&self) -> Bson {
        match self {
            AggregateTarget::Database(_) => Bson::Int32(1),
            AggregateTarget::Collection(ref ns) => Bson::String(ns.coll.to_string()),
        }
    }

    fn db_name(&self) -> &str {
        match self {
            AggregateTarget::Database(ref s) => s.as_str(),
            AggregateTarget::Collection(ref ns) => ns.db.as_str(),
        }
    }
}

impl From<Namespace> for AggregateTarget {
    fn from(ns: Namespace) -> Self {
        AggregateTarget::Collection(ns)
    }
}

/// The `aggregate` command itself.
#[derive(Debug)]
pub(crate) struct Aggregate {
    target: AggregateTarget,
    pipeline: Vec<Document>,
    options: AggregateOptions,
}

impl Aggregate {
    /// Aggregations that write their output are not run through this path.
    fn validate(&self) -> Result<()> {
        let writing_stage = self
            .pipeline
            .last()
            .and_then(serde_util::first_key)
            .filter(|stage| *stage == "$out" || *stage == "$merge");
        match writing_stage {
            Some(stage) => Err(Error::invalid_argument(format!(
                "pipelines ending in {stage} are not supported by a cursor-returning aggregation"
            ))),
            None => Ok(()),
        }
    }

    fn cursor_options(&self) -> CursorOptions {
        CursorOptions {
            batch_size: self.options.batch_size,
            limit: None,
            max_time: self.options.max_await_time,
            comment: self.options.comment.clone(),
        }
    }
}

impl OperationWithDefaults for Aggregate {
    type O = CursorInfo;

    const NAME: &'static str = "aggregate";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        self.validate()?;
        let mut body = doc! {
            Self::NAME: self.target.to_bson(),
            "pipeline": self.pipeline.clone(),
            "cursor": {},
        };
        append_options(&mut body, Some(&self.options))?;

        Ok(Command::new(Self::NAME, self.target.db_name(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let body: CursorBody = response.body()?;
        Ok(body.cursor)
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

/// Runs an aggregation pipeline and returns a cursor over its results, deserialized as `T`.
///
/// The command is executed through [`RetryableReadOperationExecutor`], so it is retried once
/// after a retryable error. The returned cursor keeps a handle on the server that answered.
#[derive_where(Debug)]
pub struct AggregateOperation<T> {
    command: Aggregate,
    #[derive_where(skip)]
    _phantom: PhantomData<fn() -> T>,
}

impl<T> AggregateOperation<T>
where
    T: DeserializeOwned + Send,
{
    /// Creates an aggregation of `pipeline` over `target`.
    pub fn new(
        target: impl Into<AggregateTarget>,
        pipeline: impl IntoIterator<Item = Document>,
        options: impl Into<Option<AggregateOptions>>,
    ) -> Self {
        Self {
            command: Aggregate {
                target: target.into(),
                pipeline: pipeline.into_iter().collect(),
                options: options.into().unwrap_or_default(),
            },
            _phantom: PhantomData,
        }
    }

    /// The stages that will be sent to the server.
    pub fn pipeline(&self) -> &[Document] {
        &self.command.pipeline
    }

    /// Selects a server through `binding` and runs the aggregation, retrying once if
    /// `retry_settings` allow it.
    pub async fn execute(
        &mut self,
        binding: &dyn ReadBinding,
        session: &mut ClientSession,
        retry_settings: RetrySettings,
        cancellation_token: CancellationToken,
    ) -> Result<AsyncCursor<T>> {
        self.command.validate()?;
        let mut context = RetryableReadContext::create(
            binding,
            session,
            retry_settings.retry_reads,
            cancellation_token,
        )
        .await?;
        RetryableReadOperationExecutor::execute(self, &mut context).await
    }
}

impl<T> RetryableReadOperation for AggregateOperation<T>
where
    T: DeserializeOwned + Send,
{
    type O = AsyncCursor<T>;

    fn execute_attempt<'a>(
        &'a mut self,
        context: &'a mut RetryableReadContext<'_>,
        attempt: u32,
        transaction_number: Option<i64>,
    ) -> BoxFuture<'a, Result<Self::O>> {
        Box::pin(async move {
            let info = RetryableReadOperation::execute_attempt(
                &mut self.command,
                &mut *context,
                attempt,
                transaction_number,
            )
            .await?;

            if let Some(at_cluster_time) = info.at_cluster_time {
                context.session_mut().set_snapshot_time(at_cluster_time);
            }
            Ok(AsyncCursor::new(
                context.channel_source().fork(),
                context.session().clone(),
                info.ns,
                info.id,
                info.first_batch,
                info.post_batch_resume_token,
                self.command.cursor_options(),
            ))
        })
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}
