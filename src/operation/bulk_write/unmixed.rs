//! Execution of a batch of requests that all have the same type.

use crate::{
    batch::{split_off_batch, BatchLimits, BatchableSource, IndexMap},
    bson::doc,
    cmap::{Command, RawCommandResponse, StreamDescription},
    concern::WriteConcern,
    error::{
        BulkWriteOperationWriteError,
        Error,
        ErrorKind,
        Result,
        WriteConcernError,
        WriteFailure,
    },
    operation::{
        bulk_write::{WriteRequest, WriteRequestType},
        execute_on_channel,
        OperationWithDefaults,
        Retryability,
        RetryableWriteContext,
        RetryableWriteOperation,
        RetryableWriteOperationExecutor,
        WriteResponseBody,
    },
    options::BulkWriteOptions,
    results::BulkWriteUpsert,
    serde_util,
    BoxFuture,
    Namespace,
};

/// Room left in a message for everything but the statements.
const COMMAND_OVERHEAD_SIZE: usize = 16_000;

/// Update and delete statements wrap a document of up to the maximum size.
const STATEMENT_OVERHEAD_SIZE: usize = 16 * 1024;

/// What one batch did, with every index already mapped back to the caller's list.
#[derive(Debug)]
pub(super) struct BatchResult {
    pub(super) request_type: WriteRequestType,
    pub(super) n: i64,
    pub(super) n_modified: Option<i64>,
    pub(super) upserts: Vec<BulkWriteUpsert>,
    pub(super) write_errors: Vec<BulkWriteOperationWriteError>,
    pub(super) write_concern_error: Option<WriteConcernError>,
    pub(super) processed: Vec<(usize, WriteRequest)>,
    pub(super) unprocessed: Vec<(usize, WriteRequest)>,
}

impl BatchResult {
    fn new(request_type: WriteRequestType) -> Self {
        Self {
            request_type,
            n: 0,
            n_modified: Some(0),
            upserts: Vec::new(),
            write_errors: Vec::new(),
            write_concern_error: None,
            processed: Vec::new(),
            unprocessed: Vec::new(),
        }
    }

    /// Folds in the reply to a command that sent `requests`, the first of which sits at
    /// `offset` in the batch. Returns whether an ordered write must stop here.
    fn record(
        &mut self,
        response: WriteResponseBody,
        offset: usize,
        requests: Vec<WriteRequest>,
        index_map: &IndexMap,
        ordered: bool,
    ) -> Result<bool> {
        let map_index =
            |statement_index: usize| original_index(index_map, offset + statement_index);

        self.n += response.n;
        if self.request_type == WriteRequestType::Update {
            self.n_modified = match (self.n_modified, response.n_modified) {
                (Some(total), Some(n_modified)) => Some(total + n_modified),
                _ => None,
            };
        }
        for upserted in response.upserted {
            self.upserts.push(BulkWriteUpsert {
                index: map_index(upserted.index)?,
                id: upserted.id,
            });
        }

        // The server stops an ordered command at its first failed statement.
        let processed_count = if ordered {
            response
                .write_errors
                .iter()
                .map(|error| error.index + 1)
                .min()
                .map_or(requests.len(), |count| count.min(requests.len()))
        } else {
            requests.len()
        };
        for (statement_index, request) in requests.into_iter().enumerate() {
            let entry = (map_index(statement_index)?, request);
            if statement_index < processed_count {
                self.processed.push(entry);
            } else {
                self.unprocessed.push(entry);
            }
        }

        let stop = ordered && !response.write_errors.is_empty();
        for error in response.write_errors {
            let index = map_index(error.index)?;
            self.write_errors
                .push(BulkWriteOperationWriteError::from_indexed(error, index));
        }
        if response.write_concern_error.is_some() {
            self.write_concern_error = response.write_concern_error;
        }
        Ok(stop)
    }
}

fn original_index(index_map: &IndexMap, batch_index: usize) -> Result<usize> {
    index_map.map(batch_index).ok_or_else(|| {
        Error::invalid_response(format!(
            "the server reported statement {batch_index}, which is not part of the batch"
        ))
    })
}

/// One insert, update or delete command covering a prefix of the source's window.
#[derive(Debug)]
struct WriteCommand<'a> {
    ns: &'a Namespace,
    request_type: WriteRequestType,
    source: BatchableSource<WriteRequest>,
    options: &'a BulkWriteOptions,
    write_concern: WriteConcern,
    retryability: Retryability,
    retrying: bool,
}

impl WriteCommand<'_> {
    fn limits(&self, description: &StreamDescription) -> BatchLimits {
        let max_count = self
            .options
            .max_batch_count
            .map_or(usize::MAX, |count| count as usize)
            .min(description.max_write_batch_count());
        let max_document_size = usize::try_from(description.max_bson_object_size).unwrap_or(0);
        let max_item_size = match self.request_type {
            WriteRequestType::Insert => max_document_size,
            WriteRequestType::Update | WriteRequestType::Delete => {
                max_document_size + STATEMENT_OVERHEAD_SIZE
            }
        };
        BatchLimits {
            max_count,
            max_size: description
                .max_message_size()
                .saturating_sub(COMMAND_OVERHEAD_SIZE),
            max_item_size,
        }
    }
}

impl OperationWithDefaults for WriteCommand<'_> {
    type O = WriteResponseBody;

    const NAME: &'static str = "write";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        // A retry resends exactly what the first attempt sent.
        if !self.retrying {
            let limits = self.limits(description);
            split_off_batch(&mut self.source, limits, |request| {
                serde_util::document_size(&request.to_statement()?)
            })?;
        }
        let statements = self
            .source
            .processed_items()
            .iter()
            .map(WriteRequest::to_statement)
            .collect::<Result<Vec<_>>>()?;

        let name = self.request_type.command_name();
        let mut body = doc! {
            name: self.ns.coll.as_str(),
            "ordered": self.options.is_ordered(),
        };
        if self.request_type != WriteRequestType::Delete {
            if let Some(bypass) = self.options.bypass_document_validation {
                body.insert("bypassDocumentValidation", bypass);
            }
        }
        if let Some(ref comment) = self.options.comment {
            body.insert("comment", comment.clone());
        }
        if self.request_type != WriteRequestType::Insert {
            if let Some(ref let_vars) = self.options.let_vars {
                body.insert("let", let_vars.clone());
            }
        }

        let mut command = Command::new(name, &self.ns.db, body);
        command.set_write_concern(&self.write_concern)?;
        command.add_document_sequence(self.request_type.sequence_identifier(), statements);
        Ok(command)
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        response.body()
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        Some(&self.write_concern)
    }

    fn retryability(&self) -> Retryability {
        self.retryability
    }

    fn name(&self) -> &str {
        self.request_type.command_name()
    }
}

/// Sends the requests of one batch in as many commands as the server's limits require, each
/// through the retryable write executor.
#[derive(Debug)]
pub(super) struct BulkUnmixedWriteOperation<'a> {
    command: WriteCommand<'a>,
    /// The reply of the last attempt, kept when it carried a write concern error.
    last_response: Option<WriteResponseBody>,
}

impl<'a> BulkUnmixedWriteOperation<'a> {
    pub(super) fn new(
        ns: &'a Namespace,
        request_type: WriteRequestType,
        requests: Vec<WriteRequest>,
        options: &'a BulkWriteOptions,
        write_concern: WriteConcern,
        retryability: Retryability,
    ) -> Self {
        Self {
            command: WriteCommand {
                ns,
                request_type,
                source: BatchableSource::new(requests),
                options,
                write_concern,
                retryability,
                retrying: false,
            },
            last_response: None,
        }
    }

    /// Executes the whole batch on the context's channel. Indexes in the result are mapped
    /// through `index_map`.
    pub(super) async fn execute(
        mut self,
        context: &mut RetryableWriteContext<'_>,
        index_map: &IndexMap,
    ) -> Result<BatchResult> {
        let ordered = self.command.options.is_ordered();
        let mut result = BatchResult::new(self.command.request_type);

        while self.command.source.has_items() {
            self.last_response = None;
            let response = match RetryableWriteOperationExecutor::execute(&mut self, context).await
            {
                Ok(response) => response,
                Err(error) if error.is_write_concern_error() => match self.last_response.take() {
                    Some(response) => response,
                    None => return Err(error),
                },
                Err(error) => return Err(error),
            };

            let source = &mut self.command.source;
            let offset = source.offset();
            let requests = source.processed_items().to_vec();
            source.advance_past_processed_items();

            if result.record(response, offset, requests, index_map, ordered)? {
                let source = &self.command.source;
                for (i, request) in source.window().iter().enumerate() {
                    let index = original_index(index_map, source.offset() + i)?;
                    result.unprocessed.push((index, request.clone()));
                }
                break;
            }
        }
        Ok(result)
    }
}

impl RetryableWriteOperation for BulkUnmixedWriteOperation<'_> {
    type O = WriteResponseBody;

    fn execute_attempt<'a>(
        &'a mut self,
        context: &'a mut RetryableWriteContext<'_>,
        attempt: u32,
        transaction_number: Option<i64>,
    ) -> BoxFuture<'a, Result<Self::O>> {
        Box::pin(async move {
            self.command.retrying = attempt > 1;
            let (channel, session) = context.channel_and_session();
            let response =
                execute_on_channel(&mut self.command, channel, session, transaction_number).await?;

            // Surfaced as an error so that a retryable write concern error is retried. The reply
            // is kept for when it is not.
            match response.write_concern_error.clone() {
                Some(write_concern_error) => {
                    let labels = response.labels.clone();
                    self.last_response = Some(response);
                    Err(Error::new(
                        ErrorKind::Write(WriteFailure::WriteConcernError(write_concern_error)),
                        Some(labels),
                    ))
                }
                None => Ok(response),
            }
        })
    }

    fn is_acknowledged(&self) -> bool {
        self.command.write_concern.is_acknowledged()
    }

    fn retryability(&self) -> Retryability {
        self.command.retryability
    }
}
