use serde::Deserialize;

use crate::{
    bson::doc,
    cmap::{Command, RawCommandResponse, StreamDescription},
    error::{Error, ErrorKind, Result},
    operation::OperationWithDefaults,
    sdam::ServerAddress,
    Namespace,
};

/// Releases a server cursor before it is exhausted.
#[derive(Debug)]
pub(crate) struct KillCursors {
    ns: Namespace,
    cursor_id: i64,
    server: ServerAddress,
}

impl KillCursors {
    pub(crate) fn new(ns: Namespace, cursor_id: i64, server: ServerAddress) -> Self {
        Self {
            ns,
            cursor_id,
            server,
        }
    }
}

impl OperationWithDefaults for KillCursors {
    type O = ();

    const NAME: &'static str = "killCursors";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "cursors": [self.cursor_id],
        };
        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        let body: KillCursorsResponseBody = response.body()?;
        if !body.cursors_not_found.is_empty() {
            return Err(ErrorKind::CursorNotFound {
                cursor_id: self.cursor_id,
                server: self.server.to_string(),
            }
            .into());
        }
        if !body.cursors_killed.contains(&self.cursor_id) {
            return Err(Error::invalid_response(format!(
                "killCursors did not report cursor {} as killed",
                self.cursor_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KillCursorsResponseBody {
    #[serde(default)]
    cursors_killed: Vec<i64>,
    #[serde(default)]
    cursors_not_found: Vec<i64>,
}
