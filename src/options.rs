//! Contains the types needed to specify options to operations.
//!
//! The options structs use the [`typed-builder`](https://crates.io/crates/typed-builder) crate to
//! derive a type-safe builder API, and serde so they can be loaded from configuration files and
//! appended to command documents:
//!
//! ```rust
//! # use mongodb_core::options::AggregateOptions;
//! let options = AggregateOptions::builder()
//!     .allow_disk_use(true)
//!     .batch_size(5)
//!     .build();
//! ```


use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

pub use crate::concern::{Acknowledgment, ReadConcern, ReadConcernLevel, WriteConcern};
use crate::{
    bson::{doc, Bson, Document},
    error::Result,
    serde_util,
};

/// Whether reads and writes may be retried once after a transient error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, TypedBuilder)]
#[serde(rename_all = "camelCase", default)]
#[non_exhaustive]
pub struct RetrySettings {
    /// Retry read operations once on a retryable error.
    #[builder(default = true)]
    pub retry_reads: bool,

    /// Retry write operations once on a retryable error.
    #[builder(default = true)]
    pub retry_writes: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            retry_reads: true,
            retry_writes: true,
        }
    }
}

/// Specifies the index to use for an operation.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum Hint {
    /// Specifies the keys of the index to use.
    Keys(Document),
    /// Specifies the name of the index to use.
    Name(String),
}

impl Hint {
    pub(crate) fn to_bson(&self) -> Bson {
        match self {
            Hint::Keys(ref d) => Bson::Document(d.clone()),
            Hint::Name(ref s) => Bson::String(s.clone()),
        }
    }
}

/// A collation configuration.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, TypedBuilder, PartialEq)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct Collation {
    /// The ICU locale.
    #[builder(!default)]
    pub locale: String,

    /// The level of comparison to perform.
    pub strength: Option<CollationStrength>,

    /// Whether to include a separate level for case differences.
    pub case_level: Option<bool>,

    /// Whether to compare numeric strings as numbers or strings.
    pub numeric_ordering: Option<bool>,

    /// Whether strings with diacritics sort from the back of the string.
    pub backwards: Option<bool>,
}

/// The level of comparison to perform, sent as its ICU level number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CollationStrength {
    Primary,
    Secondary,
    Tertiary,
    Quaternary,
    Identical,
}

impl Serialize for CollationStrength {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let level = match self {
            Self::Primary => 1,
            Self::Secondary => 2,
            Self::Tertiary => 3,
            Self::Quaternary => 4,
            Self::Identical => 5,
        };
        serializer.serialize_i32(level)
    }
}

impl<'de> Deserialize<'de> for CollationStrength {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match i32::deserialize(deserializer)? {
            1 => Ok(Self::Primary),
            2 => Ok(Self::Secondary),
            3 => Ok(Self::Tertiary),
            4 => Ok(Self::Quaternary),
            5 => Ok(Self::Identical),
            other => Err(serde::de::Error::custom(format!(
                "invalid collation strength: {other}"
            ))),
        }
    }
}

/// Specifies the options to an aggregation.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, TypedBuilder, Serialize)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct AggregateOptions {
    /// Enables writing to temporary files.
    pub allow_disk_use: Option<bool>,

    /// The number of documents the server should return per cursor batch.
    #[serde(serialize_with = "serialize_batch_size", rename(serialize = "cursor"))]
    pub batch_size: Option<u32>,

    /// The collation to use for the operation.
    pub collation: Option<Collation>,

    /// Tags the query with an arbitrary value to help trace the operation through the database
    /// profiler, currentOp and logs.
    #[builder(setter(into))]
    pub comment: Option<Bson>,

    /// The index to use for the operation.
    pub hint: Option<Hint>,

    /// Map of parameter names and values that can be accessed using `$$var` in the pipeline.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// The maximum amount of time the server waits for new documents on each `getMore`.
    #[serde(
        skip_serializing,
        default,
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_millis"
    )]
    pub max_await_time: Option<Duration>,

    /// The maximum amount of time to allow the query to run.
    #[serde(
        serialize_with = "serde_util::serialize_duration_option_as_int_millis",
        rename = "maxTimeMS",
        default,
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_millis"
    )]
    pub max_time: Option<Duration>,

    /// The read concern to use for the operation.
    pub read_concern: Option<ReadConcern>,
}

/// Serializes the batch size into the `cursor` sub-document of an aggregate command.
fn serialize_batch_size<S: Serializer>(
    val: &Option<u32>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match val {
        Some(v) => {
            let v = i32::try_from(*v).map_err(serde::ser::Error::custom)?;
            doc! { "batchSize": v }.serialize(serializer)
        }
        None => serializer.serialize_none(),
    }
}

/// How a cursor sizes and bounds its batches.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder, PartialEq)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct CursorOptions {
    /// The number of documents requested per `getMore`; zero leaves the choice to the server.
    #[serde(serialize_with = "serde_util::serialize_u32_option_as_i32")]
    pub batch_size: Option<u32>,

    /// The total number of documents the cursor may return. A negative limit asks for a single
    /// batch of at most `|limit|` documents.
    pub limit: Option<i64>,

    /// Sent as `maxTimeMS` on every `getMore`.
    #[serde(
        serialize_with = "serde_util::serialize_duration_option_as_int_millis",
        default,
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_millis"
    )]
    pub max_time: Option<Duration>,

    /// Sent with every `getMore` to servers that accept it.
    #[builder(setter(into))]
    pub comment: Option<Bson>,
}

/// Specifies the options to a mixed bulk write.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder, PartialEq)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(strip_option)))]
#[non_exhaustive]
pub struct BulkWriteOptions {
    /// Whether the requests must be executed in order, stopping at the first failure. Defaults to
    /// true.
    pub ordered: Option<bool>,

    /// Opt out of document-level validation.
    pub bypass_document_validation: Option<bool>,

    /// Attached to every command sent for this write.
    #[builder(setter(into))]
    pub comment: Option<Bson>,

    /// Map of parameter names and values usable with `$$var` in updates and deletes.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// The write concern to use for the operation.
    pub write_concern: Option<WriteConcern>,

    /// The most requests to send in one command, on top of the server's own limit.
    #[serde(skip_serializing)]
    pub max_batch_count: Option<u32>,

    /// Whether the write may be retried once after a transient error. Defaults to true.
    #[serde(skip_serializing)]
    pub retry_requested: Option<bool>,
}

impl BulkWriteOptions {
    pub(crate) fn is_ordered(&self) -> bool {
        self.ordered.unwrap_or(true)
    }

    pub(crate) fn effective_write_concern(&self) -> WriteConcern {
        self.write_concern.clone().unwrap_or_default()
    }
}

/// Appends a serializable struct to the input document. The serializable struct MUST serialize to a
/// Document; otherwise, an error will be thrown.
pub(crate) fn append_options<T: Serialize>(doc: &mut Document, options: Option<&T>) -> Result<()> {
    if let Some(options) = options {
        let options_doc = crate::bson::to_document(options)?;
        doc.extend(options_doc);
    }
    Ok(())
}
