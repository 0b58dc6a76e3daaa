//! Fixtures shared by the unit tests of every module.


pub(crate) use mock::{MockBinding, MockReply};

use crate::bson::{doc, Document};

/// The session id attached to commands in tests.
pub(crate) fn lsid() -> Document {
    doc! { "id": "test-session" }
}

/// A document with an `_id` and an `x` field.
pub(crate) fn numbered(i: i32) -> Document {
    doc! { "_id": i, "x": i }
}

/// `n` numbered documents starting at `start`.
pub(crate) fn numbered_docs(start: i32, n: i32) -> Vec<Document> {
    (start..start + n).map(numbered).collect()
}
