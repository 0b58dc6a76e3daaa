//! Batch-at-a-time iteration over the results of a query.
//!
//! An [`AsyncCursor`] starts out holding the first batch that came back with the command that
//! opened it. Each call to [`AsyncCursor::move_next`] exposes one batch through
//! [`AsyncCursor::current`]: the first call exposes the first batch without a round trip, later
//! calls send a `getMore` on a channel from the cursor's channel source until the server reports
//! the cursor as exhausted (id 0) or the cursor's limit is reached. Closing the cursor while the
//! server still holds it sends a best-effort `killCursors`.
//!
//! [`AsyncCursorEnumerator`] flattens the batches into single documents.

mod enumerator;

use std::time::Duration;

use derive_where::derive_where;
use serde::de::DeserializeOwned;

pub use self::enumerator::AsyncCursorEnumerator;
use crate::{
    bson::{Bson, Document},
    cmap::{ChannelSource, ChannelSourceHandle},
    error::{Error, ErrorKind, Result},
    operation::{execute_on_channel, GetMore, GetMoreResult, KillCursors},
    options::CursorOptions,
    runtime,
    session::ClientSession,
    trace::{TracingRepresentation, CURSOR_TRACING_EVENT_TARGET},
    Namespace,
};

const KILL_CURSORS_TIMEOUT: Duration = Duration::from_secs(10);

/// A server cursor together with the batch it currently exposes.
///
/// The cursor owns a channel source on the server that holds the cursor, and gives it up as soon
/// as the server reports the cursor as exhausted. Dropping a cursor that was not closed and is
/// still open on the server kills it in the background.
///
/// The cursor sends its `getMore` and `killCursors` commands with its own copy of the session it
/// was opened with, so the operation time those replies advance is not seen by the caller's
/// session. Read it from [`session`](AsyncCursor::session) and pass it to
/// [`ClientSession::advance_operation_time`] where causal ordering matters.
#[derive_where(Debug; T)]
pub struct AsyncCursor<T> {
    #[derive_where(skip)]
    channel_source: Option<ChannelSourceHandle>,
    session: ClientSession,
    namespace: Namespace,
    cursor_id: i64,
    first_batch: Option<Vec<Document>>,
    current_batch: Option<Vec<T>>,
    count: usize,
    limit: Option<usize>,
    single_batch: bool,
    batch_size: Option<u32>,
    max_time: Option<Duration>,
    comment: Option<Bson>,
    post_batch_resume_token: Option<Document>,
    was_first_batch_empty: bool,
    closed: bool,
}

impl<T> AsyncCursor<T>
where
    T: DeserializeOwned + Send,
{
    /// Creates a cursor over a batch returned by the command that opened cursor `cursor_id` on
    /// the server behind `channel_source`.
    ///
    /// A positive limit truncates `first_batch` to the limit. When `cursor_id` is 0 the server
    /// holds no cursor and `channel_source` is released immediately.
    pub fn new(
        channel_source: ChannelSourceHandle,
        session: ClientSession,
        namespace: Namespace,
        cursor_id: i64,
        mut first_batch: Vec<Document>,
        post_batch_resume_token: Option<Document>,
        options: CursorOptions,
    ) -> Self {
        let single_batch = options.limit.is_some_and(|limit| limit < 0);
        let limit = options
            .limit
            .map(|limit| usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX));

        let was_first_batch_empty = first_batch.is_empty();
        if let Some(limit) = limit.filter(|limit| *limit > 0) {
            first_batch.truncate(limit);
        }
        let count = first_batch.len();

        Self {
            channel_source: (cursor_id != 0).then_some(channel_source),
            session,
            namespace,
            cursor_id,
            first_batch: Some(first_batch),
            current_batch: None,
            count,
            limit,
            single_batch,
            batch_size: options.batch_size,
            max_time: options.max_time,
            comment: options.comment,
            post_batch_resume_token,
            was_first_batch_empty,
            closed: false,
        }
    }

    /// Advances to the next batch. Returns `false` once the cursor is exhausted, and on every
    /// later call.
    ///
    /// Every batch fetched from the server counts as a batch, even an empty one. Fails with
    /// [`ErrorKind::CursorClosed`] after [`close`](AsyncCursor::close).
    pub async fn move_next(&mut self) -> Result<bool> {
        if self.closed {
            return Err(ErrorKind::CursorClosed.into());
        }

        if let Some(first_batch) = self.first_batch.take() {
            self.current_batch = Some(deserialize_batch(first_batch)?);
            return Ok(true);
        }

        if self.current_batch.is_none() {
            return Ok(false);
        }

        if self.cursor_id == 0 || self.single_batch || self.is_limit_reached() {
            self.current_batch = None;
            return Ok(false);
        }

        let result = self.get_more().await?;
        self.save_batch(result)?;
        Ok(true)
    }

    /// The batch exposed by the last successful [`move_next`](AsyncCursor::move_next), or `None`
    /// before the first call and after exhaustion.
    pub fn current(&self) -> Option<&[T]> {
        self.current_batch.as_deref()
    }

    /// Takes the documents of the current batch, leaving it empty. The cursor's position is not
    /// affected.
    pub(crate) fn take_current_batch(&mut self) -> Vec<T> {
        self.current_batch
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// The server cursor id; 0 once the server holds no more results.
    pub fn id(&self) -> i64 {
        self.cursor_id
    }

    /// The namespace the cursor iterates over.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The resume token reported with the most recent batch.
    pub fn post_batch_resume_token(&self) -> Option<&Document> {
        self.post_batch_resume_token.as_ref()
    }

    /// Whether the command that opened the cursor returned no documents at all.
    pub fn was_first_batch_empty(&self) -> bool {
        self.was_first_batch_empty
    }

    /// Whether [`close`](AsyncCursor::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The cursor's copy of the session it was opened with, as advanced by its own commands.
    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Closes the cursor, killing it on the server if it is still open there. Failures to kill
    /// the cursor are logged and otherwise ignored. Closing an already closed cursor does
    /// nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.first_batch = None;
        self.current_batch = None;

        let Some(channel_source) = self.channel_source.take() else {
            return;
        };
        if self.cursor_id != 0 {
            kill_cursor_quietly(
                channel_source.as_ref(),
                &mut self.session,
                self.namespace.clone(),
                self.cursor_id,
            )
            .await;
        }
    }

    fn positive_limit(&self) -> Option<usize> {
        self.limit.filter(|limit| *limit > 0)
    }

    fn is_limit_reached(&self) -> bool {
        self.positive_limit().is_some_and(|limit| self.count >= limit)
    }

    /// The `batchSize` of the next `getMore`: the configured batch size, capped by what is left
    /// of the limit.
    fn get_more_batch_size(&self) -> Option<i32> {
        let mut number_to_return = self.batch_size.map_or(0, |size| size as usize);
        if let Some(limit) = self.positive_limit() {
            let remaining = limit.saturating_sub(self.count);
            if number_to_return == 0 || number_to_return > remaining {
                number_to_return = remaining;
            }
        }

        if self.batch_size.is_some_and(|size| size > 0) || self.positive_limit().is_some() {
            Some(i32::try_from(number_to_return).unwrap_or(i32::MAX))
        } else {
            None
        }
    }

    async fn get_more(&mut self) -> Result<GetMoreResult> {
        let channel_source = self.channel_source.as_ref().ok_or_else(|| {
            Error::internal("an open cursor has no channel source")
        })?;
        let mut channel = channel_source.get_channel().await?;
        let mut get_more = GetMore::new(
            self.namespace.clone(),
            self.cursor_id,
            channel_source.server_address().clone(),
        )
        .batch_size(self.get_more_batch_size())
        .max_time(self.max_time)
        .comment(self.comment.clone());

        execute_on_channel(&mut get_more, channel.as_mut(), &mut self.session, None).await
    }

    fn save_batch(&mut self, result: GetMoreResult) -> Result<()> {
        let mut documents = result.batch;
        self.count += documents.len();
        if let Some(limit) = self.positive_limit() {
            if self.count > limit {
                let remove = self.count - limit;
                documents.truncate(documents.len() - remove);
                self.count = limit;
            }
        }

        self.current_batch = Some(deserialize_batch(documents)?);
        self.cursor_id = result.id;
        self.post_batch_resume_token = result.post_batch_resume_token;

        if self.cursor_id == 0 {
            self.channel_source = None;
        }
        Ok(())
    }
}

impl<T> Drop for AsyncCursor<T> {
    fn drop(&mut self) {
        if self.closed || self.cursor_id == 0 {
            return;
        }
        let Some(channel_source) = self.channel_source.take() else {
            return;
        };
        let mut session = std::mem::take(&mut self.session);
        let namespace = self.namespace.clone();
        let cursor_id = self.cursor_id;
        runtime::spawn(async move {
            kill_cursor_quietly(channel_source.as_ref(), &mut session, namespace, cursor_id).await;
        });
    }
}

fn deserialize_batch<T: DeserializeOwned>(batch: Vec<Document>) -> Result<Vec<T>> {
    batch
        .into_iter()
        .map(|document| crate::bson::from_document(document).map_err(Error::from))
        .collect()
}

async fn kill_cursor(
    channel_source: &dyn ChannelSource,
    session: &mut ClientSession,
    namespace: Namespace,
    cursor_id: i64,
) -> Result<()> {
    let mut channel = channel_source.get_channel().await?;
    let mut kill_cursors =
        KillCursors::new(namespace, cursor_id, channel_source.server_address().clone());
    execute_on_channel(&mut kill_cursors, channel.as_mut(), session, None).await
}

async fn kill_cursor_quietly(
    channel_source: &dyn ChannelSource,
    session: &mut ClientSession,
    namespace: Namespace,
    cursor_id: i64,
) {
    let kill = kill_cursor(channel_source, session, namespace, cursor_id);
    match tokio::time::timeout(KILL_CURSORS_TIMEOUT, kill).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => tracing::debug!(
            target: CURSOR_TRACING_EVENT_TARGET,
            cursorId = cursor_id,
            error = error.tracing_representation(),
            "Ignoring killCursors failure"
        ),
        Err(_) => tracing::debug!(
            target: CURSOR_TRACING_EVENT_TARGET,
            cursorId = cursor_id,
            "killCursors timed out"
        ),
    }
}
