//! The execution core of a MongoDB driver, plus a LINQ-style query translator.
//!
//! The crate covers the parts of a driver that sit between a public collection API and the
//! connection pool:
//!
//! - retryable execution of read and write operations, which retry once on a fresh channel after a
//!   transient error ([`operation::retryable`]);
//! - the cursor protocol that pulls further batches with `getMore` and releases server cursors
//!   with `killCursors` ([`cursor`]);
//! - mixed bulk writes, split into homogeneous insert/update/delete commands that fit the
//!   server's limits ([`operation::bulk_write`]);
//! - a translator from typed query expressions (`Where`, `Select`, `GroupBy`, ...) to aggregation
//!   pipelines ([`linq`]).
//!
//! Networking, pooling and server selection are left to the caller, who provides them through the
//! [`binding`] and [`cmap`] traits. BSON support comes from the re-exported [`bson`] crate.
//!
//! Every network-touching operation is async and runs on [`tokio`]. With the default `sync`
//! feature, [`sync`] exposes blocking wrappers that drive the same futures.
//!
//! # Translating and running a query
//!
//! ```rust
//! use mongodb_core::{
//!     bson::doc,
//!     linq::{Expression, PipelineTranslator, QueryMethod, Serializer},
//! };
//!
//! let source = Expression::queryable(Serializer::document("Person", ["name", "age"]));
//! let adults = Expression::call(
//!     QueryMethod::Where,
//!     vec![
//!         source,
//!         Expression::lambda(
//!             ["p"],
//!             Expression::gte(Expression::member(Expression::parameter("p"), "age"), 18),
//!         ),
//!     ],
//! );
//!
//! let pipeline = PipelineTranslator::translate(&adults)?;
//! assert_eq!(pipeline.render(), vec![doc! { "$match": { "age": { "$gte": 18 } } }]);
//! # Ok::<(), mongodb_core::error::Error>(())
//! ```

#![warn(missing_docs)]
#![cfg_attr(
    feature = "cargo-clippy",
    allow(clippy::unreadable_literal, clippy::float_cmp)
)]

pub mod options;

pub use ::bson;

mod batch;
pub mod binding;
pub mod cmap;
mod concern;
pub mod cursor;
pub mod error;
pub mod linq;
mod namespace;
pub mod operation;
pub mod results;
pub(crate) mod runtime;
pub mod sdam;
mod serde_util;
mod session;
#[cfg(feature = "sync")]
pub mod sync;
#[cfg(test)]
mod test;
mod trace;

use std::{future::Future, pin::Pin};

pub use crate::{
    batch::{BatchableSource, IndexMap},
    cursor::{AsyncCursor, AsyncCursorEnumerator},
    namespace::Namespace,
    session::{ClientSession, TransactionState},
};

/// A boxed, sendable future, as returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
