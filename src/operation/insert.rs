use crate::{
    bson::{oid::ObjectId, Bson, Document},
    error::Result,
};

/// A document to insert.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct InsertRequest {
    pub document: Document,
}

impl InsertRequest {
    /// Wraps `document`, giving it a generated `_id` first if it has none. The id is assigned
    /// here so that a retried insert sends the same document again.
    pub fn new(mut document: Document) -> Self {
        if !document.contains_key("_id") {
            let mut with_id = Document::new();
            with_id.insert("_id", ObjectId::new());
            with_id.extend(document);
            document = with_id;
        }
        Self { document }
    }

    /// The `_id` of the document.
    pub fn id(&self) -> Option<&Bson> {
        self.document.get("_id")
    }

    pub(crate) fn to_statement(&self) -> Result<Document> {
        Ok(self.document.clone())
    }
}

impl From<Document> for InsertRequest {
    fn from(document: Document) -> Self {
        Self::new(document)
    }
}
