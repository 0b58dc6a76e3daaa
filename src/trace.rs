use crate::bson::{Bson, Document};

#[cfg(test)]
mod test;

pub(crate) const COMMAND_TRACING_EVENT_TARGET: &str = "mongodb_core::command";
pub(crate) const RETRY_TRACING_EVENT_TARGET: &str = "mongodb_core::retry";
pub(crate) const CURSOR_TRACING_EVENT_TARGET: &str = "mongodb_core::cursor";
pub(crate) const BULK_WRITE_TRACING_EVENT_TARGET: &str = "mongodb_core::bulk_write";
pub(crate) const LINQ_TRACING_EVENT_TARGET: &str = "mongodb_core::linq";

/// Commands and replies longer than this are truncated before being attached to tracing events.
pub(crate) const DEFAULT_MAX_DOCUMENT_LENGTH_BYTES: usize = 1000;

pub(crate) trait TracingRepresentation {
    type Representation;

    fn tracing_representation(&self) -> Self::Representation;
}

impl TracingRepresentation for Document {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        serialize_command_or_reply(self, DEFAULT_MAX_DOCUMENT_LENGTH_BYTES)
    }
}

impl TracingRepresentation for crate::error::Error {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}

impl TracingRepresentation for [Document] {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        let stages = Bson::Array(self.iter().cloned().map(Bson::Document).collect());
        let mut s = stages.into_relaxed_extjson().to_string();
        truncate_on_char_boundary(&mut s, DEFAULT_MAX_DOCUMENT_LENGTH_BYTES);
        s
    }
}

pub(crate) fn serialize_command_or_reply(doc: &Document, max_length_bytes: usize) -> String {
    let mut s = Bson::Document(doc.clone())
        .into_relaxed_extjson()
        .to_string();
    truncate_on_char_boundary(&mut s, max_length_bytes);
    s
}

/// Truncates `s` to the first char boundary at or after `new_len` and marks the cut with `...`.
pub(crate) fn truncate_on_char_boundary(s: &mut String, new_len: usize) {
    if new_len >= s.len() {
        return;
    }
    let mut boundary = new_len;
    while !s.is_char_boundary(boundary) {
        boundary += 1;
    }
    if boundary < s.len() {
        s.truncate(boundary);
        s.push_str("...");
    }
}
