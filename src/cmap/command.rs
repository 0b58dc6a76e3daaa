use serde::de::DeserializeOwned;

use crate::{
    bson::{Bson, Document},
    concern::WriteConcern,
    error::{CommandError, Error, ErrorKind, Result},
    operation::CommandErrorBody,
    sdam::ServerAddress,
    serde_util,
};

/// Whether the sender waits for a reply to a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResponseHandling {
    /// Wait for and return the server's reply.
    #[default]
    Return,
    /// Fire and forget, used for unacknowledged writes.
    Ignore,
}

/// A list of documents sent alongside a command body instead of inside it.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSequence {
    pub identifier: String,
    pub documents: Vec<Document>,
}

/// Driver side model of a database command.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct Command {
    pub name: String,
    pub target_db: String,
    pub body: Document,
    pub document_sequences: Vec<DocumentSequence>,
    pub response_handling: ResponseHandling,
}

impl Command {
    pub(crate) fn new(name: impl ToString, target_db: impl ToString, body: Document) -> Self {
        Self {
            name: name.to_string(),
            target_db: target_db.to_string(),
            body,
            document_sequences: Vec::new(),
            response_handling: ResponseHandling::Return,
        }
    }

    pub(crate) fn add_document_sequence(
        &mut self,
        identifier: impl ToString,
        documents: Vec<Document>,
    ) {
        self.document_sequences.push(DocumentSequence {
            identifier: identifier.to_string(),
            documents,
        });
    }

    /// The documents of the sequence with the given identifier.
    pub fn document_sequence(&self, identifier: &str) -> Option<&[Document]> {
        self.document_sequences
            .iter()
            .find(|sequence| sequence.identifier == identifier)
            .map(|sequence| sequence.documents.as_slice())
    }

    pub(crate) fn set_session(&mut self, lsid: &Document) {
        self.body.insert("lsid", lsid.clone());
    }

    pub(crate) fn set_txn_number(&mut self, txn_number: i64) {
        self.body.insert("txnNumber", txn_number);
    }

    pub(crate) fn set_write_concern(&mut self, write_concern: &WriteConcern) -> Result<()> {
        if !write_concern.is_empty() {
            self.body
                .insert("writeConcern", crate::bson::to_document(write_concern)?);
        }
        if !write_concern.is_acknowledged() {
            self.response_handling = ResponseHandling::Ignore;
        }
        Ok(())
    }

    /// The value stored under the command name, e.g. the cursor id of a `getMore`.
    pub fn target(&self) -> Option<&Bson> {
        self.body.get(&self.name)
    }
}

/// A reply received from the server.
#[derive(Clone, Debug, PartialEq)]
pub struct RawCommandResponse {
    pub(crate) source: ServerAddress,
    raw: Document,
}

impl RawCommandResponse {
    /// Wraps a reply document received from `source`.
    pub fn with_document_and_address(source: ServerAddress, raw: Document) -> Self {
        Self { source, raw }
    }

    /// The placeholder used in place of a reply for fire-and-forget commands.
    pub(crate) fn unacknowledged(source: ServerAddress) -> Self {
        Self::with_document_and_address(source, crate::bson::doc! { "ok": 1 })
    }

    /// Whether the command succeeded (`ok: 1`).
    pub fn is_success(&self) -> bool {
        self.raw.get("ok").and_then(serde_util::get_int) == Some(1)
    }

    pub(crate) fn body<T: DeserializeOwned>(&self) -> Result<T> {
        crate::bson::from_document(self.raw.clone()).map_err(|e| {
            Error::invalid_response(format!("unable to deserialize {}: {e}", self.source_name()))
        })
    }

    pub(crate) fn raw_body(&self) -> &Document {
        &self.raw
    }

    fn source_name(&self) -> String {
        format!("reply from {}", self.source)
    }

    /// Converts a failed reply into a command error, keeping its error labels.
    pub(crate) fn command_error(&self) -> Error {
        match self.body::<CommandErrorBody>() {
            Ok(error_body) => error_body.into(),
            Err(_) => ErrorKind::Command(CommandError {
                code: 0,
                code_name: String::new(),
                message: format!("command failed without an error body: {}", self.raw),
            })
            .into(),
        }
    }
}
