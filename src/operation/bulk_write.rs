//! Mixed bulk writes: a list of inserts, updates and deletes executed as a sequence of
//! single-type commands.
//!
//! Requests are grouped into batches of one request type. An ordered bulk write takes the longest
//! run of same-type requests from the front of what is left, so batches execute in input order,
//! and it stops after the first batch that reports a write error. An unordered bulk write takes
//! every remaining request of the type of the first remaining request, and always executes every
//! batch. Each batch keeps an [`IndexMap`] from its own positions back to the caller's indexes,
//! and every result and error reported to the caller uses the caller's indexes.

mod unmixed;

#[cfg(test)]
mod test;

use std::collections::VecDeque;

use tokio_util::sync::CancellationToken;

pub use super::{
    delete::{DeleteLimit, DeleteRequest},
    insert::InsertRequest,
    update::{UpdateModification, UpdateRequest},
};
use self::unmixed::{BatchResult, BulkUnmixedWriteOperation};
use crate::{
    batch::IndexMap,
    binding::WriteBinding,
    bson::Document,
    concern::WriteConcern,
    error::{
        BulkWriteOperationError,
        BulkWriteOperationWriteError,
        Error,
        ErrorKind,
        Result,
        WriteConcernError,
    },
    operation::{RetryableWriteContext, Retryability},
    options::{BulkWriteOptions, Hint, RetrySettings},
    results::{BulkWriteOperationResult, BulkWriteUpsert},
    session::ClientSession,
    trace::BULK_WRITE_TRACING_EVENT_TARGET,
    Namespace,
};

/// The kind of a write request, and of every request in one batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum WriteRequestType {
    #[display("insert")]
    Insert,
    #[display("update")]
    Update,
    #[display("delete")]
    Delete,
}

impl WriteRequestType {
    /// The name of the command that executes requests of this type.
    pub(crate) fn command_name(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// The name of the document sequence holding the command's statements.
    pub(crate) fn sequence_identifier(self) -> &'static str {
        match self {
            Self::Insert => "documents",
            Self::Update => "updates",
            Self::Delete => "deletes",
        }
    }
}

/// One request of a bulk write.
#[derive(Clone, Debug, PartialEq, derive_more::From)]
#[non_exhaustive]
pub enum WriteRequest {
    Insert(InsertRequest),
    Update(UpdateRequest),
    Delete(DeleteRequest),
}

impl WriteRequest {
    pub fn request_type(&self) -> WriteRequestType {
        match self {
            Self::Insert(_) => WriteRequestType::Insert,
            Self::Update(_) => WriteRequestType::Update,
            Self::Delete(_) => WriteRequestType::Delete,
        }
    }

    pub(crate) fn hint(&self) -> Option<&Hint> {
        match self {
            Self::Insert(_) => None,
            Self::Update(update) => update.hint.as_ref(),
            Self::Delete(delete) => delete.hint.as_ref(),
        }
    }

    /// Whether the request may touch more than one document, which rules out retrying it.
    pub(crate) fn is_multi(&self) -> bool {
        match self {
            Self::Insert(_) => false,
            Self::Update(update) => update.multi,
            Self::Delete(delete) => delete.limit == DeleteLimit::Many,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Self::Update(update) => update.validate(),
            Self::Insert(_) | Self::Delete(_) => Ok(()),
        }
    }

    /// The statement sent for this request inside an insert, update or delete command.
    pub(crate) fn to_statement(&self) -> Result<Document> {
        match self {
            Self::Insert(insert) => insert.to_statement(),
            Self::Update(update) => update.to_statement(),
            Self::Delete(delete) => delete.to_statement(),
        }
    }
}

/// Requests of one type gathered from the caller's list.
#[derive(Debug)]
struct Batch {
    request_type: WriteRequestType,
    requests: Vec<WriteRequest>,
    index_map: IndexMap,
    write_concern: WriteConcern,
}

/// Executes a mixed list of write requests against one collection.
#[derive(Clone, Debug)]
pub struct BulkMixedWriteOperation {
    ns: Namespace,
    requests: Vec<WriteRequest>,
    options: BulkWriteOptions,
}

impl BulkMixedWriteOperation {
    pub fn new(
        ns: Namespace,
        requests: impl IntoIterator<Item = WriteRequest>,
        options: impl Into<Option<BulkWriteOptions>>,
    ) -> Self {
        Self {
            ns,
            requests: requests.into_iter().collect(),
            options: options.into().unwrap_or_default(),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    pub fn requests(&self) -> &[WriteRequest] {
        &self.requests
    }

    pub fn is_ordered(&self) -> bool {
        self.options.is_ordered()
    }

    /// Checks everything that can be checked without contacting a server.
    fn validate(&self, write_concern: &WriteConcern) -> Result<()> {
        if self.requests.is_empty() {
            return Err(Error::invalid_argument(
                "a bulk write must contain at least one request",
            ));
        }
        write_concern.validate()?;
        if !write_concern.is_acknowledged() && self.requests.iter().any(|r| r.hint().is_some()) {
            return Err(Error::invalid_argument(
                "hints are not supported with an unacknowledged write concern",
            ));
        }
        self.requests.iter().try_for_each(WriteRequest::validate)
    }

    /// Selects a writable server through `binding` and executes every batch, in order for an
    /// ordered bulk write.
    ///
    /// Commands of a batch are retried once after a retryable error when both `retry_settings`
    /// and the options allow it, unless the batch contains a multi-document update or delete.
    /// Write errors and write concern errors are reported as an
    /// [`ErrorKind::BulkWrite`] error that carries the result of everything that was processed.
    pub async fn execute(
        &self,
        binding: &dyn WriteBinding,
        session: &mut ClientSession,
        retry_settings: RetrySettings,
        cancellation_token: CancellationToken,
    ) -> Result<BulkWriteOperationResult> {
        let write_concern = self.options.effective_write_concern();
        self.validate(&write_concern)?;

        let retry_requested =
            retry_settings.retry_writes && self.options.retry_requested.unwrap_or(true);
        let mut context =
            RetryableWriteContext::create(binding, session, retry_requested, cancellation_token)
                .await?;

        let mut remaining: VecDeque<(usize, WriteRequest)> =
            self.requests.iter().cloned().enumerate().collect();
        let mut results = Vec::new();
        while let Some(batch) = self.next_batch(&mut remaining, &write_concern) {
            tracing::debug!(
                target: BULK_WRITE_TRACING_EVENT_TARGET,
                requestType = %batch.request_type,
                requestCount = batch.requests.len(),
                remaining = remaining.len(),
                "Executing bulk write batch"
            );
            let retryability = if batch.requests.iter().any(WriteRequest::is_multi) {
                Retryability::None
            } else {
                Retryability::Write
            };
            let operation = BulkUnmixedWriteOperation::new(
                &self.ns,
                batch.request_type,
                batch.requests,
                &self.options,
                batch.write_concern,
                retryability,
            );
            let result = operation.execute(&mut context, &batch.index_map).await?;
            let stop = self.is_ordered() && !result.write_errors.is_empty();
            results.push(result);
            if stop {
                break;
            }
        }

        self.combine(results, remaining, &write_concern)
    }

    /// Takes the next batch off the front of `remaining`.
    fn next_batch(
        &self,
        remaining: &mut VecDeque<(usize, WriteRequest)>,
        write_concern: &WriteConcern,
    ) -> Option<Batch> {
        let request_type = remaining.front()?.1.request_type();

        let (index_map, requests) = if self.is_ordered() {
            let count = remaining
                .iter()
                .take_while(|(_, request)| request.request_type() == request_type)
                .count();
            let original_offset = remaining.front().map_or(0, |(index, _)| *index);
            let requests: Vec<WriteRequest> =
                remaining.drain(..count).map(|(_, request)| request).collect();
            (IndexMap::range(0, original_offset, count), requests)
        } else {
            let (matching, rest): (VecDeque<_>, VecDeque<_>) = std::mem::take(remaining)
                .into_iter()
                .partition(|(_, request)| request.request_type() == request_type);
            *remaining = rest;
            let index_map = matching
                .iter()
                .enumerate()
                .fold(IndexMap::dictionary(), |map, (batch_index, (original_index, _))| {
                    map.add(batch_index, *original_index)
                });
            (
                index_map,
                matching.into_iter().map(|(_, request)| request).collect(),
            )
        };

        // A later batch of an ordered write must not start before this one has completed.
        let write_concern =
            if !write_concern.is_acknowledged() && self.is_ordered() && !remaining.is_empty() {
                WriteConcern::w1()
            } else {
                write_concern.clone()
            };

        Some(Batch {
            request_type,
            requests,
            index_map,
            write_concern,
        })
    }

    /// Merges the batch results into the caller facing result, or into the error reporting the
    /// write failures.
    fn combine(
        &self,
        results: Vec<BatchResult>,
        never_sent: VecDeque<(usize, WriteRequest)>,
        write_concern: &WriteConcern,
    ) -> Result<BulkWriteOperationResult> {
        let request_count = self.requests.len();
        let mut processed: Vec<(usize, WriteRequest)> = Vec::new();
        let mut unprocessed: Vec<(usize, WriteRequest)> = never_sent.into_iter().collect();
        let mut write_errors: Vec<BulkWriteOperationWriteError> = Vec::new();
        let mut write_concern_error: Option<WriteConcernError> = None;
        let mut upserts: Vec<BulkWriteUpsert> = Vec::new();
        let (mut inserted_count, mut matched_count, mut deleted_count) = (0, 0, 0);
        let mut modified_count = Some(0);

        for result in results {
            match result.request_type {
                WriteRequestType::Insert => inserted_count += result.n,
                WriteRequestType::Delete => deleted_count += result.n,
                WriteRequestType::Update => {
                    matched_count += result.n - result.upserts.len() as i64;
                    modified_count = match (modified_count, result.n_modified) {
                        (Some(total), Some(n_modified)) => Some(total + n_modified),
                        _ => None,
                    };
                }
            }
            processed.extend(result.processed);
            unprocessed.extend(result.unprocessed);
            write_errors.extend(result.write_errors);
            upserts.extend(result.upserts);
            if result.write_concern_error.is_some() {
                write_concern_error = result.write_concern_error;
            }
        }

        processed.sort_by_key(|(index, _)| *index);
        unprocessed.sort_by_key(|(index, _)| *index);
        write_errors.sort_by_key(|error| error.index);
        upserts.sort_by_key(|upsert| upsert.index);
        let processed_requests = processed.into_iter().map(|(_, request)| request).collect();

        let result = if write_concern.is_acknowledged() {
            BulkWriteOperationResult::Acknowledged {
                request_count,
                processed_requests,
                inserted_count,
                matched_count,
                deleted_count,
                modified_count,
                upserts,
            }
        } else {
            BulkWriteOperationResult::Unacknowledged {
                request_count,
                processed_requests,
            }
        };

        if write_errors.is_empty() && write_concern_error.is_none() {
            return Ok(result);
        }
        Err(ErrorKind::BulkWrite(BulkWriteOperationError {
            result,
            write_errors,
            write_concern_error,
            unprocessed_requests: unprocessed.into_iter().map(|(_, request)| request).collect(),
        })
        .into())
    }
}
