//! Classification of errors for the retry executors.

use crate::{
    cmap::StreamDescription,
    error::{Error, ErrorKind, NO_WRITES_PERFORMED, RETRYABLE_WRITE_ERROR},
};

/// Network errors, cleared pools, and the server codes that signal a transient condition.
pub(crate) fn is_retryable_read_error(error: &Error) -> bool {
    error.is_read_retryable()
}

/// Errors labelled `RetryableWriteError`.
pub(crate) fn is_retryable_write_error(error: &Error) -> bool {
    error.is_write_retryable()
}

/// Adds the `RetryableWriteError` label to a write error if the server that produced it would have
/// added it itself on a newer version.
pub(crate) fn add_retryable_write_error_label_if_required(
    error: &mut Error,
    description: &StreamDescription,
) {
    if error.contains_label(RETRYABLE_WRITE_ERROR) {
        return;
    }
    let max_wire_version = description.max_wire_version.unwrap_or(0);
    if error.should_add_retryable_write_label(
        max_wire_version,
        Some(description.initial_server_type),
    ) {
        error.add_label(RETRYABLE_WRITE_ERROR);
    }
}

/// Whether an error from a second attempt is reported instead of the first attempt's error.
///
/// A server or driver error that is not a network error keeps the original error, and so does a
/// second attempt labelled `NoWritesPerformed`. Network errors and errors raised on the client,
/// such as a reply that does not deserialize or a cancellation, are reported.
pub(crate) fn is_reportable_second_attempt_error(error: &Error) -> bool {
    if error.contains_label(NO_WRITES_PERFORMED) {
        return false;
    }
    error.is_network_error() || !is_server_or_driver_error(error)
}

fn is_server_or_driver_error(error: &Error) -> bool {
    matches!(
        *error.kind,
        ErrorKind::Command(_)
            | ErrorKind::Write(_)
            | ErrorKind::BulkWrite(_)
            | ErrorKind::CursorNotFound { .. }
            | ErrorKind::InvalidResponse { .. }
            | ErrorKind::ServerSelection { .. }
    )
}
