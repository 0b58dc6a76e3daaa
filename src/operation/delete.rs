use typed_builder::TypedBuilder;

use crate::{
    bson::{doc, Document},
    error::Result,
    options::{Collation, Hint},
};

/// How many of the matching documents a delete removes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeleteLimit {
    /// Only the first matching document.
    #[default]
    One,
    /// Every matching document.
    Many,
}

impl DeleteLimit {
    /// The value of the statement's `limit` field, where 0 means no limit.
    fn as_i32(self) -> i32 {
        match self {
            Self::One => 1,
            Self::Many => 0,
        }
    }
}

/// A delete of the documents matching a filter.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct DeleteRequest {
    #[builder(!default)]
    pub filter: Document,

    pub limit: DeleteLimit,

    #[builder(setter(strip_option))]
    pub collation: Option<Collation>,

    #[builder(setter(strip_option))]
    pub hint: Option<Hint>,
}

impl DeleteRequest {
    pub(crate) fn to_statement(&self) -> Result<Document> {
        let mut statement = doc! {
            "q": self.filter.clone(),
            "limit": self.limit.as_i32(),
        };
        if let Some(ref collation) = self.collation {
            statement.insert("collation", crate::bson::to_document(collation)?);
        }
        if let Some(ref hint) = self.hint {
            statement.insert("hint", hint.to_bson());
        }
        Ok(statement)
    }
}
