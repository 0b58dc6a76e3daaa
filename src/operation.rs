//! Server side operations and the machinery that executes them.

pub mod aggregate;
pub mod bulk_write;
mod delete;
mod get_more;
mod insert;
mod kill_cursors;
pub mod retryable;
mod update;

#[cfg(test)]
mod test;

use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::{
    bson::{Bson, Document, Timestamp},
    cmap::{Channel, Command, RawCommandResponse, ResponseHandling, StreamDescription},
    concern::WriteConcern,
    error::{CommandError, Error, ErrorKind, IndexedWriteError, Result, WriteConcernError},
    session::{ClientSession, TransactionState},
    trace::{
        serialize_command_or_reply,
        TracingRepresentation,
        COMMAND_TRACING_EVENT_TARGET,
        DEFAULT_MAX_DOCUMENT_LENGTH_BYTES,
    },
    Namespace,
};

pub use self::{
    aggregate::{AggregateOperation, AggregateTarget},
    bulk_write::{
        BulkMixedWriteOperation,
        DeleteLimit,
        DeleteRequest,
        InsertRequest,
        UpdateModification,
        UpdateRequest,
        WriteRequest,
        WriteRequestType,
    },
    retryable::{
        RetryableReadContext,
        RetryableReadOperation,
        RetryableReadOperationExecutor,
        RetryableWriteContext,
        RetryableWriteOperation,
        RetryableWriteOperationExecutor,
    },
};
pub(crate) use get_more::{GetMore, GetMoreResult};
pub(crate) use kill_cursors::KillCursors;

pub(crate) const SERVER_4_4_0_WIRE_VERSION: i32 = 9;

/// A trait modeling the behavior of a server side operation that is sent as a single command.
///
/// No methods in this trait have default behaviors, so that wrapper operations replicate all
/// behavior. Defaults are provided by the `OperationWithDefaults` trait.
pub trait Operation {
    /// The output type of this operation.
    type O;

    /// The name of the server side command associated with this operation.
    const NAME: &'static str;

    /// Returns the command that should be sent to the server as part of this operation.
    /// The operation may store some additional state that is required for handling the response.
    fn build(&mut self, description: &StreamDescription) -> Result<Command>;

    /// Interprets the server response to the command.
    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O>;

    /// Interpret an error encountered while sending the built command to the server, potentially
    /// recovering.
    fn handle_error(&self, error: Error) -> Result<Self::O>;

    /// Whether or not this operation will request acknowledgment from the server.
    fn is_acknowledged(&self) -> bool;

    /// The write concern to use for this operation, if any.
    fn write_concern(&self) -> Option<&WriteConcern>;

    /// The level of retryability the operation supports.
    fn retryability(&self) -> Retryability;

    /// Updates this operation as needed for a retry.
    fn update_for_retry(&mut self);

    fn name(&self) -> &str;
}

/// Whether an operation may be retried, and under which rules.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Retryability {
    Write,
    Read,
    None,
}

// A mirror of the `Operation` trait, with default behavior where appropriate. Should only be
// implemented by operation types that do not delegate to other operations.
pub trait OperationWithDefaults {
    /// The output type of this operation.
    type O;

    /// The name of the server side command associated with this operation.
    const NAME: &'static str;

    /// Returns the command that should be sent to the server as part of this operation.
    fn build(&mut self, description: &StreamDescription) -> Result<Command>;

    /// Interprets the server response to the command.
    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O>;

    /// Interpret an error encountered while sending the built command to the server, potentially
    /// recovering.
    fn handle_error(&self, error: Error) -> Result<Self::O> {
        Err(error)
    }

    /// Whether or not this operation will request acknowledgment from the server.
    fn is_acknowledged(&self) -> bool {
        self.write_concern()
            .map(WriteConcern::is_acknowledged)
            .unwrap_or(true)
    }

    /// The write concern to use for this operation, if any.
    fn write_concern(&self) -> Option<&WriteConcern> {
        None
    }

    /// The level of retryability the operation supports.
    fn retryability(&self) -> Retryability {
        Retryability::None
    }

    /// Updates this operation as needed for a retry.
    fn update_for_retry(&mut self) {}

    fn name(&self) -> &str {
        Self::NAME
    }
}

impl<T: OperationWithDefaults> Operation for T {
    type O = T::O;
    const NAME: &'static str = T::NAME;
    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        self.build(description)
    }
    fn handle_response(
        &self,
        response: RawCommandResponse,
        description: &StreamDescription,
    ) -> Result<Self::O> {
        self.handle_response(response, description)
    }
    fn handle_error(&self, error: Error) -> Result<Self::O> {
        self.handle_error(error)
    }
    fn is_acknowledged(&self) -> bool {
        self.is_acknowledged()
    }
    fn write_concern(&self) -> Option<&WriteConcern> {
        self.write_concern()
    }
    fn retryability(&self) -> Retryability {
        self.retryability()
    }
    fn update_for_retry(&mut self) {
        self.update_for_retry()
    }
    fn name(&self) -> &str {
        self.name()
    }
}

/// Builds the operation's command, attaches the session fields, sends it over `channel` and
/// interprets the reply.
pub(crate) async fn execute_on_channel<T: Operation>(
    op: &mut T,
    channel: &mut dyn Channel,
    session: &mut ClientSession,
    txn_number: Option<i64>,
) -> Result<T::O> {
    let description = channel.description().clone();
    let mut command = op.build(&description)?;

    let in_transaction = session.in_transaction();
    if command.response_handling == ResponseHandling::Return || in_transaction {
        if let Some(lsid) = session.id() {
            command.set_session(lsid);
        }
    }
    if let Some(txn_number) = txn_number {
        command.set_txn_number(txn_number);
    } else if in_transaction {
        command.set_txn_number(session.txn_number());
    }
    if in_transaction {
        if session.transaction_state() == &TransactionState::Starting {
            command.body.insert("startTransaction", true);
        }
        command.body.insert("autocommit", false);
        session.mark_transaction_in_progress();
    }

    tracing::debug!(
        target: COMMAND_TRACING_EVENT_TARGET,
        command = serialize_command_or_reply(&command.body, DEFAULT_MAX_DOCUMENT_LENGTH_BYTES),
        databaseName = command.target_db.as_str(),
        commandName = command.name.as_str(),
        serverHost = description.server_address.host.as_str(),
        serverPort = description.server_address.port_or_default(),
        "Command started"
    );

    let name = command.name.clone();
    let start = Instant::now();
    let result = channel.command(command).await;
    let duration = start.elapsed();

    let response = match result {
        Ok(Some(response)) if response.is_success() => response,
        Ok(Some(response)) => {
            let error = trace_failure(&name, &description, duration, response.command_error());
            return op.handle_error(error);
        }
        Ok(None) => RawCommandResponse::unacknowledged(description.server_address.clone()),
        Err(error) => {
            if error.is_network_error() {
                session.mark_dirty();
            }
            let error = trace_failure(&name, &description, duration, error);
            return op.handle_error(error);
        }
    };

    tracing::debug!(
        target: COMMAND_TRACING_EVENT_TARGET,
        reply = response.raw_body().tracing_representation(),
        commandName = name.as_str(),
        serverHost = description.server_address.host.as_str(),
        serverPort = description.server_address.port_or_default(),
        durationMS = duration.as_millis(),
        "Command succeeded"
    );

    if let Ok(operation_time) = response.raw_body().get_timestamp("operationTime") {
        session.advance_operation_time(operation_time);
    }
    op.handle_response(response, &description)
}

fn trace_failure(
    name: &str,
    description: &StreamDescription,
    duration: Duration,
    mut error: Error,
) -> Error {
    error.wire_version = description.max_wire_version;
    tracing::debug!(
        target: COMMAND_TRACING_EVENT_TARGET,
        failure = error.tracing_representation(),
        commandName = name,
        serverHost = description.server_address.host.as_str(),
        serverPort = description.server_address.port_or_default(),
        durationMS = duration.as_millis(),
        "Command failed"
    );
    error
}

/// A response body useful for deserializing command errors.
#[derive(Deserialize, Debug)]
pub(crate) struct CommandErrorBody {
    #[serde(rename = "errorLabels")]
    pub(crate) error_labels: Option<Vec<String>>,

    #[serde(flatten)]
    pub(crate) command_error: CommandError,
}

impl From<CommandErrorBody> for Error {
    fn from(command_error_response: CommandErrorBody) -> Error {
        Error::new(
            ErrorKind::Command(command_error_response.command_error),
            command_error_response.error_labels,
        )
    }
}

/// Body of a reply to an insert, update or delete command.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WriteResponseBody {
    #[serde(default)]
    pub(crate) n: i64,

    pub(crate) n_modified: Option<i64>,

    #[serde(default)]
    pub(crate) upserted: Vec<UpsertedId>,

    #[serde(default)]
    pub(crate) write_errors: Vec<IndexedWriteError>,

    pub(crate) write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels", default)]
    pub(crate) labels: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct UpsertedId {
    pub(crate) index: usize,

    #[serde(rename = "_id")]
    pub(crate) id: Bson,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CursorBody {
    pub(crate) cursor: CursorInfo,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CursorInfo {
    pub(crate) id: i64,

    pub(crate) ns: Namespace,

    #[serde(default)]
    pub(crate) first_batch: Vec<Document>,

    pub(crate) post_batch_resume_token: Option<Document>,

    pub(crate) at_cluster_time: Option<Timestamp>,
}
