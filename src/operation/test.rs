use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Document, Timestamp},
    cmap::{ChannelHandle, Command, RawCommandResponse, StreamDescription},
    concern::WriteConcern,
    error::{ErrorKind, Result},
    operation::{execute_on_channel, OperationWithDefaults},
    session::{ClientSession, TransactionState},
    test::{lsid, MockBinding},
};

#[derive(Default)]
struct Ping {
    write_concern: Option<WriteConcern>,
}

impl OperationWithDefaults for Ping {
    type O = Document;
    const NAME: &'static str = "ping";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut command = Command::new(Self::NAME, "admin", doc! { "ping": 1 });
        if let Some(ref write_concern) = self.write_concern {
            command.set_write_concern(write_concern)?;
        }
        Ok(command)
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        Ok(response.raw_body().clone())
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.write_concern.as_ref()
    }
}

async fn channel(binding: &MockBinding) -> ChannelHandle {
    binding.channel_source().get_channel().await.unwrap()
}

#[tokio::test]
async fn session_id_and_operation_time() {
    let binding = MockBinding::new();
    let operation_time = Timestamp {
        time: 100,
        increment: 2,
    };
    binding.push_reply(doc! { "ok": 1, "operationTime": operation_time });
    let mut session = ClientSession::new(lsid());
    let mut channel = channel(&binding).await;

    let reply = execute_on_channel(&mut Ping::default(), channel.as_mut(), &mut session, None)
        .await
        .unwrap();

    assert_eq!(reply.get_i32("ok").unwrap(), 1);
    assert_eq!(binding.commands()[0].body, doc! { "ping": 1, "lsid": lsid() });
    assert_eq!(session.operation_time(), Some(operation_time));
}

#[tokio::test]
async fn transaction_number_from_the_caller() {
    let binding = MockBinding::new();
    binding.push_reply(doc! { "ok": 1 });
    let mut session = ClientSession::new(lsid());
    let mut channel = channel(&binding).await;

    execute_on_channel(&mut Ping::default(), channel.as_mut(), &mut session, Some(7))
        .await
        .unwrap();

    assert_eq!(
        binding.commands()[0].body,
        doc! { "ping": 1, "lsid": lsid(), "txnNumber": 7_i64 }
    );
}

#[tokio::test]
async fn first_statement_of_a_transaction_starts_it() {
    let binding = MockBinding::new();
    binding.push_reply(doc! { "ok": 1 });
    binding.push_reply(doc! { "ok": 1 });
    let mut session = ClientSession::new(lsid());
    session.advance_transaction_number();
    session.start_transaction();
    let mut channel = channel(&binding).await;

    for _ in 0..2 {
        execute_on_channel(&mut Ping::default(), channel.as_mut(), &mut session, None)
            .await
            .unwrap();
    }

    let commands = binding.commands();
    assert_eq!(
        commands[0].body,
        doc! {
            "ping": 1,
            "lsid": lsid(),
            "txnNumber": 1_i64,
            "startTransaction": true,
            "autocommit": false,
        }
    );
    assert_eq!(
        commands[1].body,
        doc! { "ping": 1, "lsid": lsid(), "txnNumber": 1_i64, "autocommit": false }
    );
    assert_eq!(session.transaction_state(), &TransactionState::InProgress);
}

#[tokio::test]
async fn unacknowledged_command_does_not_wait_for_a_reply() {
    let binding = MockBinding::new();
    let mut session = ClientSession::new(lsid());
    let mut channel = channel(&binding).await;
    let mut operation = Ping {
        write_concern: Some(WriteConcern::unacknowledged()),
    };

    execute_on_channel(&mut operation, channel.as_mut(), &mut session, None)
        .await
        .unwrap();

    let commands = binding.commands();
    assert_eq!(commands.len(), 1);
    assert!(!commands[0].body.contains_key("lsid"));
    assert_eq!(binding.remaining_replies(), 0);
}

#[tokio::test]
async fn command_errors_carry_the_wire_version() {
    let binding = MockBinding::new();
    binding.push_reply(doc! {
        "ok": 0,
        "code": 11600,
        "codeName": "InterruptedAtShutdown",
        "errmsg": "shutting down",
    });
    let mut session = ClientSession::new(lsid());
    let mut channel = channel(&binding).await;

    let error = execute_on_channel(&mut Ping::default(), channel.as_mut(), &mut session, None)
        .await
        .unwrap_err();

    match *error.kind {
        ErrorKind::Command(ref command_error) => {
            assert_eq!(command_error.code, 11600);
            assert_eq!(command_error.message, "shutting down");
        }
        ref other => panic!("expected a command error, got {other:?}"),
    }
    assert_eq!(error.wire_version, Some(8));
    assert!(!session.is_dirty());
}

#[tokio::test]
async fn network_errors_mark_the_session_dirty() {
    let binding = MockBinding::new();
    binding.push_error(
        ErrorKind::Io(Arc::new(std::io::ErrorKind::ConnectionReset.into())).into(),
    );
    let mut session = ClientSession::new(lsid());
    let mut channel = channel(&binding).await;

    let error = execute_on_channel(&mut Ping::default(), channel.as_mut(), &mut session, None)
        .await
        .unwrap_err();

    assert!(error.is_network_error());
    assert!(session.is_dirty());
}
