use std::sync::Arc;

use pretty_assertions::assert_eq;

use crate::{
    error::{
        CommandError,
        Error,
        ErrorKind,
        WriteConcernError,
        WriteFailure,
        RETRYABLE_WRITE_ERROR,
    },
    linq::{Expression, UnsupportedExpressionError},
    sdam::ServerType,
};

fn command_error(code: i32) -> Error {
    ErrorKind::Command(CommandError {
        code,
        code_name: String::new(),
        message: String::new(),
    })
    .into()
}

fn write_concern_error(code: i32, labels: Vec<String>) -> Error {
    ErrorKind::Write(WriteFailure::WriteConcernError(WriteConcernError {
        code,
        code_name: String::new(),
        message: "waiting for replication timed out".to_string(),
        details: None,
        labels,
    }))
    .into()
}

#[test]
fn read_retryable_codes() {
    for code in [11600, 10107, 91, 6, 89, 9001, 134, 262] {
        assert!(command_error(code).is_read_retryable(), "code {code}");
    }
    assert!(!command_error(2).is_read_retryable());
    assert!(!command_error(11000).is_read_retryable());
    assert!(Error::network_timeout().is_read_retryable());
}

#[test]
fn write_retryable_only_with_label() {
    let mut error = command_error(91);
    assert!(!error.is_write_retryable());

    error.add_label(RETRYABLE_WRITE_ERROR);
    assert!(error.is_write_retryable());
}

#[test]
fn label_from_source_is_visible() {
    let mut source = command_error(91);
    source.add_label(RETRYABLE_WRITE_ERROR);
    let error = Error::internal("wrapped").with_source(source);

    assert!(error.contains_label(RETRYABLE_WRITE_ERROR));
    assert!(error.labels().is_empty());
    assert_eq!(error.sdam_code(), Some(91));
}

#[test]
fn retryable_write_label_on_older_servers() {
    assert!(command_error(11600).should_add_retryable_write_label(8, None));
    assert!(!command_error(134).should_add_retryable_write_label(8, None));
    assert!(!write_concern_error(91, Vec::new())
        .should_add_retryable_write_label(8, Some(ServerType::Mongos)));
    assert!(write_concern_error(91, Vec::new())
        .should_add_retryable_write_label(8, Some(ServerType::RsPrimary)));
}

#[test]
fn retryable_write_label_on_newer_servers() {
    assert!(!command_error(11600).should_add_retryable_write_label(9, None));
    assert!(Error::network_timeout().should_add_retryable_write_label(9, None));
}

#[test]
fn write_concern_error_labels_are_lifted() {
    let error = write_concern_error(64, vec![RETRYABLE_WRITE_ERROR.to_string()]);

    assert!(error.is_write_concern_error());
    assert!(error.is_write_retryable());
    assert_eq!(error.code(), Some(64));
}

#[test]
fn state_change_errors() {
    assert!(command_error(10107).is_state_change_error());
    assert!(command_error(11602).is_state_change_error());
    assert!(!command_error(50).is_state_change_error());
    assert!(command_error(43).is_cursor_not_found());
}

#[test]
fn unsupported_expression_converts() {
    let expression = Expression::parameter("p");
    let error: Error = UnsupportedExpressionError::new(&expression, "it is not a query").into();

    match *error.kind {
        ErrorKind::UnsupportedExpression(ref inner) => {
            assert_eq!(inner.expression, expression);
            assert_eq!(inner.reason, "it is not a query");
        }
        ref other => panic!("expected an unsupported expression error, got {other:?}"),
    }
    assert!(!error.is_server_error());
    assert_eq!(
        error.kind.to_string(),
        "Expression not supported: p because it is not a query"
    );
}

#[test]
fn io_errors_are_network_errors() {
    let error: Error = ErrorKind::Io(Arc::new(std::io::ErrorKind::BrokenPipe.into())).into();
    assert!(error.is_network_error());
    assert!(!error.is_server_error());
    assert_eq!(error.code(), None);
}

#[test]
fn code_follows_the_server_error() {
    assert_eq!(command_error(11000).code(), Some(11000));
    assert_eq!(write_concern_error(100, Vec::new()).code(), Some(100));

    let wrapped = Error::internal("wrapped").with_source(command_error(50));
    assert_eq!(wrapped.code(), Some(50));
    assert_eq!(Error::internal("alone").code(), None);
}
