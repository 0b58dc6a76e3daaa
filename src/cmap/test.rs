use std::time::Duration;

use pretty_assertions::assert_eq;

use crate::{
    bson::{doc, Bson},
    cmap::{Command, RawCommandResponse, ResponseHandling, StreamDescription},
    concern::WriteConcern,
    error::{ErrorKind, RETRYABLE_WRITE_ERROR},
    sdam::{ServerAddress, ServerType},
};

#[test]
fn unacknowledged_write_concern_ignores_reply() {
    let mut command = Command::new("insert", "db", doc! { "insert": "coll" });
    command
        .set_write_concern(&WriteConcern::unacknowledged())
        .unwrap();
    assert_eq!(command.response_handling, ResponseHandling::Ignore);
    assert_eq!(command.body.get_document("writeConcern").unwrap(), &doc! { "w": 0 });

    let mut command = Command::new("insert", "db", doc! { "insert": "coll" });
    command.set_write_concern(&WriteConcern::default()).unwrap();
    assert_eq!(command.response_handling, ResponseHandling::Return);
    assert!(!command.body.contains_key("writeConcern"));
}

#[test]
fn session_fields() {
    let mut command = Command::new("getMore", "db", doc! { "getMore": 5_i64 });
    command.set_session(&doc! { "id": 1 });
    command.set_txn_number(3);
    command.add_document_sequence("documents", vec![doc! { "x": 1 }]);

    assert_eq!(command.target(), Some(&Bson::Int64(5)));
    assert_eq!(command.body.get_document("lsid").unwrap(), &doc! { "id": 1 });
    assert_eq!(command.body.get_i64("txnNumber").unwrap(), 3);
    assert_eq!(
        command.document_sequence("documents"),
        Some(&[doc! { "x": 1 }][..])
    );
    assert!(command.document_sequence("updates").is_none());
}

#[test]
fn command_error_keeps_labels() {
    let response = RawCommandResponse::with_document_and_address(
        ServerAddress::default(),
        doc! {
            "ok": 0,
            "code": 91,
            "codeName": "ShutdownInProgress",
            "errmsg": "shutting down",
            "errorLabels": [RETRYABLE_WRITE_ERROR],
        },
    );
    assert!(!response.is_success());

    let error = response.command_error();
    assert!(error.contains_label(RETRYABLE_WRITE_ERROR));
    match *error.kind {
        ErrorKind::Command(ref command_error) => {
            assert_eq!(command_error.code, 91);
            assert_eq!(command_error.code_name, "ShutdownInProgress");
        }
        ref other => panic!("expected command error, got {other:?}"),
    }
}

#[test]
fn ok_may_be_a_double() {
    let response = RawCommandResponse::with_document_and_address(
        ServerAddress::default(),
        doc! { "ok": 1.0 },
    );
    assert!(response.is_success());
}

#[test]
fn retryable_write_support() {
    assert!(StreamDescription::new_testing().supports_retryable_writes());

    let standalone = StreamDescription::builder()
        .initial_server_type(ServerType::Standalone)
        .max_wire_version(17)
        .logical_session_timeout(Duration::from_secs(60))
        .build();
    assert!(!standalone.supports_retryable_writes());

    let no_sessions = StreamDescription::builder()
        .initial_server_type(ServerType::RsPrimary)
        .max_wire_version(17)
        .build();
    assert!(!no_sessions.supports_retryable_writes());

    let load_balanced = StreamDescription::builder()
        .initial_server_type(ServerType::LoadBalancer)
        .build();
    assert!(load_balanced.supports_retryable_writes());
}
