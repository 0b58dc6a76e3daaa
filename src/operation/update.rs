use serde::Serialize;
use typed_builder::TypedBuilder;

use crate::{
    bson::{doc, Bson, Document},
    error::Result,
    options::{Collation, Hint},
    serde_util,
};

/// How an update changes the documents it matches.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum UpdateModification {
    /// An update document made of update operators, e.g. `{ "$set": { "x": 1 } }`.
    Document(Document),

    /// An aggregation pipeline computing the new document.
    Pipeline(Vec<Document>),

    /// A whole new document, without update operators.
    Replacement(Document),
}

impl UpdateModification {
    fn validate(&self) -> Result<()> {
        match self {
            Self::Document(update) => serde_util::update_document_check(update),
            Self::Pipeline(_) => Ok(()),
            Self::Replacement(replacement) => serde_util::replacement_document_check(replacement),
        }
    }

    fn to_bson(&self) -> Bson {
        match self {
            Self::Document(document) | Self::Replacement(document) => {
                Bson::Document(document.clone())
            }
            Self::Pipeline(pipeline) => {
                Bson::Array(pipeline.iter().cloned().map(Bson::Document).collect())
            }
        }
    }
}

impl From<Document> for UpdateModification {
    fn from(document: Document) -> Self {
        Self::Document(document)
    }
}

impl From<Vec<Document>> for UpdateModification {
    fn from(pipeline: Vec<Document>) -> Self {
        Self::Pipeline(pipeline)
    }
}

/// An update or replacement of the documents matching a filter.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct UpdateRequest {
    #[builder(!default)]
    pub filter: Document,

    #[builder(!default)]
    pub update: UpdateModification,

    /// Whether every matching document is updated rather than only the first one.
    pub multi: bool,

    /// Whether a document is inserted when nothing matches the filter.
    #[builder(setter(strip_option))]
    pub upsert: Option<bool>,

    #[builder(setter(strip_option))]
    pub collation: Option<Collation>,

    /// Filters selecting which array elements an update operator modifies.
    #[builder(setter(strip_option))]
    pub array_filters: Option<Vec<Document>>,

    #[builder(setter(strip_option))]
    pub hint: Option<Hint>,
}

impl UpdateRequest {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.multi && matches!(self.update, UpdateModification::Replacement(_)) {
            return Err(crate::error::Error::invalid_argument(
                "a replacement can only apply to a single document",
            ));
        }
        self.update.validate()
    }

    pub(crate) fn to_statement(&self) -> Result<Document> {
        let mut statement = doc! {
            "q": self.filter.clone(),
            "u": self.update.to_bson(),
        };
        if self.multi {
            statement.insert("multi", true);
        }
        if self.upsert == Some(true) {
            statement.insert("upsert", true);
        }
        if let Some(ref collation) = self.collation {
            statement.insert("collation", crate::bson::to_document(collation)?);
        }
        if let Some(ref array_filters) = self.array_filters {
            statement.insert("arrayFilters", array_filters.clone());
        }
        if let Some(ref hint) = self.hint {
            statement.insert("hint", hint.to_bson());
        }
        Ok(statement)
    }
}
