use std::time::Duration;

use serde::Deserialize;

use crate::{
    bson::{doc, Bson, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{Error, ErrorKind, Result},
    operation::{OperationWithDefaults, SERVER_4_4_0_WIRE_VERSION},
    sdam::ServerAddress,
    serde_util,
    Namespace,
};

/// Fetches the next batch of an open server cursor.
#[derive(Debug)]
pub(crate) struct GetMore {
    ns: Namespace,
    cursor_id: i64,
    server: ServerAddress,
    batch_size: Option<i32>,
    max_time: Option<Duration>,
    comment: Option<Bson>,
}

impl GetMore {
    pub(crate) fn new(ns: Namespace, cursor_id: i64, server: ServerAddress) -> Self {
        Self {
            ns,
            cursor_id,
            server,
            batch_size: None,
            max_time: None,
            comment: None,
        }
    }

    /// A batch size of zero leaves the size up to the server.
    pub(crate) fn batch_size(mut self, batch_size: Option<i32>) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub(crate) fn max_time(mut self, max_time: Option<Duration>) -> Self {
        self.max_time = max_time;
        self
    }

    pub(crate) fn comment(mut self, comment: Option<Bson>) -> Self {
        self.comment = comment;
        self
    }
}

/// The documents and cursor state returned by a `getMore`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GetMoreResult {
    pub(crate) batch: Vec<Document>,
    pub(crate) id: i64,
    pub(crate) post_batch_resume_token: Option<Document>,
}

impl OperationWithDefaults for GetMore {
    type O = GetMoreResult;

    const NAME: &'static str = "getMore";

    fn build(&mut self, description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: self.cursor_id,
            "collection": self.ns.coll.clone(),
        };

        if let Some(batch_size) = self.batch_size {
            if batch_size < 0 {
                return Err(Error::invalid_argument(
                    "The batch size of a getMore must not be negative",
                ));
            } else if batch_size != 0 {
                body.insert("batchSize", batch_size);
            }
        }

        if let Some(max_time) = self.max_time {
            body.insert("maxTimeMS", serde_util::max_time_ms(max_time));
        }

        if let Some(ref comment) = self.comment {
            if description
                .max_wire_version
                .is_some_and(|version| version >= SERVER_4_4_0_WIRE_VERSION)
            {
                body.insert("comment", comment.clone());
            }
        }

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let response: GetMoreResponseBody = response.body()?;
        Ok(GetMoreResult {
            batch: response.cursor.next_batch,
            id: response.cursor.id,
            post_batch_resume_token: response.cursor.post_batch_resume_token,
        })
    }

    fn handle_error(&self, error: Error) -> Result<Self::O> {
        if error.is_cursor_not_found() {
            return Err(Error::from(ErrorKind::CursorNotFound {
                cursor_id: self.cursor_id,
                server: self.server.to_string(),
            })
            .with_source(error));
        }
        Err(error)
    }
}

#[derive(Debug, Deserialize)]
struct GetMoreResponseBody {
    cursor: NextBatchBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NextBatchBody {
    id: i64,
    #[serde(default)]
    next_batch: Vec<Document>,
    post_batch_resume_token: Option<Document>,
}
