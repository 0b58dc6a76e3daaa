use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson, Document},
    cmap::{Command, RawCommandResponse, StreamDescription},
    concern::WriteConcern,
    error::{Error, ErrorKind, Result, NO_WRITES_PERFORMED},
    operation::{
        retryable::executor::select_error,
        OperationWithDefaults,
        Retryability,
        RetryableReadOperationExecutor,
        RetryableWriteOperationExecutor,
    },
    sdam::{ServerAddress, ServerType},
    session::ClientSession,
    test::{lsid, MockBinding},
};

struct TestRead;

impl OperationWithDefaults for TestRead {
    type O = Document;
    const NAME: &'static str = "find";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        Ok(Command::new(Self::NAME, "db", doc! { "find": "coll" }))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        Ok(response.raw_body().clone())
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

#[derive(Default)]
struct TestWrite {
    write_concern: Option<WriteConcern>,
}

impl OperationWithDefaults for TestWrite {
    type O = Document;
    const NAME: &'static str = "insert";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        let mut command = Command::new(Self::NAME, "db", doc! { "insert": "coll" });
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

    fn retryability(&self) -> Retryability {
        Retryability::Write
    }
}

fn a() -> ServerAddress {
    ServerAddress::new("a", 27017)
}

fn b() -> ServerAddress {
    ServerAddress::new("b", 27017)
}

fn command_error(code: i32) -> Document {
    doc! { "ok": 0, "code": code, "codeName": "Test", "errmsg": "injected" }
}

fn is_command_error(error: &Error, expected: i32) -> bool {
    matches!(*error.kind, ErrorKind::Command(ref e) if e.code == expected)
}

#[tokio::test]
async fn read_succeeds_without_retry() {
    let binding = MockBinding::new();
    binding.push_reply(doc! { "ok": 1, "n": 1 });
    let mut session = ClientSession::new(lsid());
    let mut context = binding.read_context(&mut session, true).await;

    let reply = RetryableReadOperationExecutor::execute(&mut TestRead, &mut context)
        .await
        .unwrap();
    assert_eq!(reply.get_i32("n").unwrap(), 1);
    drop(context);

    assert_eq!(binding.selections(), vec![Vec::<ServerAddress>::new()]);
    assert_eq!(binding.command_names(), vec!["find".to_string()]);
}

#[tokio::test]
async fn read_retries_once_on_another_server() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    binding.push_reply(doc! { "ok": 1 });
    let mut session = ClientSession::new(lsid());
    let mut context = binding.read_context(&mut session, true).await;

    RetryableReadOperationExecutor::execute(&mut TestRead, &mut context)
        .await
        .unwrap();
    drop(context);

    assert_eq!(binding.selections(), vec![vec![], vec![a()]]);
    assert_eq!(binding.command_targets(), vec![a(), b()]);
    assert_eq!(binding.channels_dropped(), 2);
    assert_eq!(binding.sources_dropped(), 2);
}

#[tokio::test]
async fn read_not_retried_when_not_requested() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    let mut session = ClientSession::new(lsid());
    let mut context = binding.read_context(&mut session, false).await;

    let error = RetryableReadOperationExecutor::execute(&mut TestRead, &mut context)
        .await
        .unwrap_err();
    assert!(error.is_network_error());
    assert_eq!(binding.commands().len(), 1);
}

#[tokio::test]
async fn read_not_retried_in_transaction() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    let mut session = ClientSession::new(lsid());
    session.start_transaction();
    let mut context = binding.read_context(&mut session, true).await;

    let error = RetryableReadOperationExecutor::execute(&mut TestRead, &mut context)
        .await
        .unwrap_err();
    assert!(error.is_network_error());
    assert_eq!(binding.commands().len(), 1);
    assert_eq!(binding.selections().len(), 1);
}

#[tokio::test]
async fn read_not_retried_after_non_retryable_error() {
    let binding = MockBinding::new();
    binding.push_reply(command_error(2));
    let mut session = ClientSession::new(lsid());
    let mut context = binding.read_context(&mut session, true).await;

    let error = RetryableReadOperationExecutor::execute(&mut TestRead, &mut context)
        .await
        .unwrap_err();
    assert!(is_command_error(&error, 2));
    assert_eq!(binding.commands().len(), 1);
}

#[tokio::test]
async fn failed_reacquisition_surfaces_original_error() {
    let binding = MockBinding::new();
    binding.push_reply(command_error(11600));
    binding.fail_selections_from(1);
    let mut session = ClientSession::new(lsid());
    let mut context = binding.read_context(&mut session, true).await;

    let error = RetryableReadOperationExecutor::execute(&mut TestRead, &mut context)
        .await
        .unwrap_err();
    assert!(is_command_error(&error, 11600));
    assert_eq!(binding.commands().len(), 1);
    assert_eq!(binding.selections().len(), 2);
}

#[tokio::test]
async fn failed_write_reacquisition_surfaces_original_error() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    binding.fail_selections_from(1);
    let mut session = ClientSession::new(lsid());
    let mut context = binding.write_context(&mut session, true).await;

    let error = RetryableWriteOperationExecutor::execute(&mut TestWrite::default(), &mut context)
        .await
        .unwrap_err();
    assert!(error.is_network_error());
    assert!(!matches!(*error.kind, ErrorKind::ServerSelection { .. }));
    assert_eq!(binding.commands().len(), 1);
}

#[tokio::test]
async fn server_error_on_second_attempt_surfaces_original_error() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    binding.push_reply(command_error(11600));
    let mut session = ClientSession::new(lsid());
    let mut context = binding.read_context(&mut session, true).await;

    let error = RetryableReadOperationExecutor::execute(&mut TestRead, &mut context)
        .await
        .unwrap_err();
    assert!(error.is_network_error());
    assert_eq!(binding.commands().len(), 2);
}

#[tokio::test]
async fn network_error_on_second_attempt_is_surfaced() {
    let binding = MockBinding::new();
    binding.push_reply(command_error(11600));
    binding.push_error(Error::network_timeout());
    let mut session = ClientSession::new(lsid());
    let mut context = binding.read_context(&mut session, true).await;

    let error = RetryableReadOperationExecutor::execute(&mut TestRead, &mut context)
        .await
        .unwrap_err();
    assert!(error.is_network_error());
    assert_eq!(binding.commands().len(), 2);
}

struct CountRead;

impl OperationWithDefaults for CountRead {
    type O = i32;
    const NAME: &'static str = "count";

    fn build(&mut self, _description: &StreamDescription) -> Result<Command> {
        Ok(Command::new(Self::NAME, "db", doc! { "count": "coll" }))
    }

    fn handle_response(
        &self,
        response: RawCommandResponse,
        _description: &StreamDescription,
    ) -> Result<Self::O> {
        Ok(response.raw_body().get_i32("n")?)
    }

    fn retryability(&self) -> Retryability {
        Retryability::Read
    }
}

#[tokio::test]
async fn client_error_on_second_attempt_is_surfaced() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    binding.push_reply(doc! { "ok": 1, "n": "not-an-int" });
    let mut session = ClientSession::new(lsid());
    let mut context = binding.read_context(&mut session, true).await;

    let error = RetryableReadOperationExecutor::execute(&mut CountRead, &mut context)
        .await
        .unwrap_err();
    assert!(!error.is_network_error());
    assert!(matches!(*error.kind, ErrorKind::BsonDeserialization(_)));
    assert_eq!(binding.commands().len(), 2);
}

#[test]
fn second_attempt_error_selection() {
    let first = Error::network_timeout();
    let selected = select_error(first.clone(), Error::internal("second"));
    assert!(matches!(*selected.kind, ErrorKind::Internal { .. }));

    let selected = select_error(first.clone(), Error::invalid_response("second"));
    assert!(selected.is_network_error());

    let selected = select_error(
        first,
        ErrorKind::ServerSelection {
            message: "no server".to_string(),
        }
        .into(),
    );
    assert!(selected.is_network_error());
}

#[test]
fn no_writes_performed_keeps_first_error() {
    let first: Error = ErrorKind::Command(crate::error::CommandError {
        code: 91,
        code_name: "ShutdownInProgress".to_string(),
        message: String::new(),
    })
    .into();
    let mut second = Error::network_timeout();
    second.add_label(NO_WRITES_PERFORMED);

    let selected = select_error(first, second);
    assert!(is_command_error(&selected, 91));

    let selected = select_error(Error::internal("first"), Error::cancelled());
    assert!(selected.is_cancelled());
}

#[tokio::test]
async fn write_attempts_share_transaction_number() {
    let binding = MockBinding::new();
    binding.push_reply(command_error(91));
    binding.push_reply(doc! { "ok": 1, "n": 1 });
    let mut session = ClientSession::new(lsid());
    let mut context = binding.write_context(&mut session, true).await;

    RetryableWriteOperationExecutor::execute(&mut TestWrite::default(), &mut context)
        .await
        .unwrap();
    drop(context);

    let commands = binding.commands();
    assert_eq!(commands.len(), 2);
    for command in &commands {
        assert_eq!(command.body.get("txnNumber"), Some(&Bson::Int64(1)));
        assert_eq!(command.body.get_document("lsid").unwrap(), &lsid());
    }
    assert_eq!(session.txn_number(), 1);
}

#[tokio::test]
async fn write_not_retried_without_retryable_label() {
    let mut description = StreamDescription::with_wire_version(9);
    description.max_wire_version = Some(17);
    let binding = MockBinding::with_servers(vec![MockBinding::server("a", description)]);
    binding.push_reply(command_error(91));
    let mut session = ClientSession::new(lsid());
    let mut context = binding.write_context(&mut session, true).await;

    let error = RetryableWriteOperationExecutor::execute(&mut TestWrite::default(), &mut context)
        .await
        .unwrap_err();
    assert!(is_command_error(&error, 91));
    assert!(!error.is_write_retryable());
    assert_eq!(binding.commands().len(), 1);
}

#[tokio::test]
async fn write_without_session_id_is_not_retried() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    let mut session = ClientSession::without_id();
    let mut context = binding.write_context(&mut session, true).await;

    RetryableWriteOperationExecutor::execute(&mut TestWrite::default(), &mut context)
        .await
        .unwrap_err();

    let commands = binding.commands();
    assert_eq!(commands.len(), 1);
    assert!(!commands[0].body.contains_key("txnNumber"));
}

#[tokio::test]
async fn unacknowledged_write_is_not_retried() {
    let binding = MockBinding::new();
    let mut session = ClientSession::new(lsid());
    let mut context = binding.write_context(&mut session, true).await;
    let mut operation = TestWrite {
        write_concern: Some(WriteConcern::unacknowledged()),
    };

    let reply = RetryableWriteOperationExecutor::execute(&mut operation, &mut context)
        .await
        .unwrap();
    drop(context);
    assert_eq!(reply, doc! { "ok": 1 });

    let commands = binding.commands();
    assert_eq!(commands.len(), 1);
    assert!(!commands[0].body.contains_key("txnNumber"));
    assert!(!commands[0].body.contains_key("lsid"));
    assert_eq!(session.txn_number(), 0);
}

#[tokio::test]
async fn write_not_retried_on_server_without_retryable_writes() {
    let mut standalone = StreamDescription::new_testing();
    standalone.initial_server_type = ServerType::Standalone;
    let binding = MockBinding::with_servers(vec![
        MockBinding::server("a", StreamDescription::new_testing()),
        MockBinding::server("b", standalone),
    ]);
    binding.push_reply(command_error(91));
    let mut session = ClientSession::new(lsid());
    let mut context = binding.write_context(&mut session, true).await;

    let error = RetryableWriteOperationExecutor::execute(&mut TestWrite::default(), &mut context)
        .await
        .unwrap_err();
    assert!(is_command_error(&error, 91));
    assert!(error.is_write_retryable());
    assert_eq!(binding.commands().len(), 1);
    assert_eq!(binding.selections().len(), 2);
}

#[tokio::test]
async fn unsupported_transaction_numbers_error_is_rewritten() {
    let binding = MockBinding::new();
    binding.push_reply(doc! {
        "ok": 0,
        "code": 20,
        "codeName": "IllegalOperation",
        "errmsg": "Transaction numbers are only allowed on a replica set member or mongos",
    });
    let mut session = ClientSession::new(lsid());
    let mut context = binding.write_context(&mut session, true).await;

    let error = RetryableWriteOperationExecutor::execute(&mut TestWrite::default(), &mut context)
        .await
        .unwrap_err();
    match *error.kind {
        ErrorKind::Command(ref command_error) => {
            assert!(command_error.message.contains("does not support retryable writes"))
        }
        ref other => panic!("expected command error, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_before_first_attempt() {
    let binding = MockBinding::new();
    let mut session = ClientSession::new(lsid());
    let mut context = binding.read_context(&mut session, true).await;
    context.cancellation_token().cancel();

    let error = RetryableReadOperationExecutor::execute(&mut TestRead, &mut context)
        .await
        .unwrap_err();
    assert!(error.is_cancelled());
    assert!(binding.commands().is_empty());
}

#[tokio::test]
async fn network_error_marks_session_dirty() {
    let binding = MockBinding::new();
    binding.push_error(Error::network_timeout());
    binding.push_error(Error::network_timeout());
    let mut session = ClientSession::new(lsid());
    let mut context = binding.read_context(&mut session, true).await;

    RetryableReadOperationExecutor::execute(&mut TestRead, &mut context)
        .await
        .unwrap_err();
    drop(context);
    assert!(session.is_dirty());
    assert_eq!(binding.commands().len(), 2);
}
