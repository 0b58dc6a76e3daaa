#![allow(missing_docs)]

use serde::Serialize;

use crate::{
    bson::Document,
    error::{IndexedWriteError, WriteConcernError},
    operation::bulk_write::WriteRequest,
    results::BulkWriteOperationResult,
};

const DUPLICATE_KEY_CODES: [i32; 3] = [11000, 11001, 12582];
const EXECUTION_TIMEOUT_CODE: i32 = 50;

/// The error returned when at least one request of a bulk write failed or its write concern could
/// not be satisfied. Indexes always refer to positions in the caller's original request list.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct BulkWriteOperationError {
    /// The result of the requests that were processed before the failure was observed.
    pub result: BulkWriteOperationResult,
    pub write_errors: Vec<BulkWriteOperationWriteError>,
    pub write_concern_error: Option<WriteConcernError>,
    /// Requests that were never sent because an ordered bulk write stopped early.
    pub unprocessed_requests: Vec<WriteRequest>,
}

/// Coarse classification of a server error code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, derive_more::Display)]
#[non_exhaustive]
pub enum ServerErrorCategory {
    DuplicateKey,
    ExecutionTimeout,
    Uncategorized,
}

impl ServerErrorCategory {
    pub(crate) fn from_code(code: i32) -> Self {
        if DUPLICATE_KEY_CODES.contains(&code) {
            Self::DuplicateKey
        } else if code == EXECUTION_TIMEOUT_CODE {
            Self::ExecutionTimeout
        } else {
            Self::Uncategorized
        }
    }
}

/// A write error for a single request of a bulk write.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct BulkWriteOperationWriteError {
    /// Index of the failed request in the original request list.
    pub index: usize,
    pub code: i32,
    pub code_name: Option<String>,
    pub message: String,
    pub details: Option<Document>,
    pub category: ServerErrorCategory,
}

impl BulkWriteOperationWriteError {
    /// Converts an error reported by one command. `index` is the position of the failed
    /// request in the original request list.
    pub(crate) fn from_indexed(error: IndexedWriteError, index: usize) -> Self {
        Self {
            index,
            category: ServerErrorCategory::from_code(error.code),
            code: error.code,
            code_name: error.code_name,
            message: error.message,
            details: error.details,
        }
    }
}

impl BulkWriteOperationError {
    /// Indexes of all failed requests, in ascending order.
    pub fn failed_indexes(&self) -> Vec<usize> {
        let mut indexes: Vec<usize> = self.write_errors.iter().map(|e| e.index).collect();
        indexes.sort_unstable();
        indexes
    }
}
