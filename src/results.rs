//! Contains the types of results returned by bulk writes.

use crate::{bson::Bson, operation::bulk_write::WriteRequest};

/// A document inserted by an update with `upsert: true`.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct BulkWriteUpsert {
    /// Index of the update request in the original request list.
    pub index: usize,

    /// The `_id` of the inserted document.
    pub id: Bson,
}

/// The combined outcome of a mixed bulk write.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum BulkWriteOperationResult {
    /// The server acknowledged the writes and reported counts.
    Acknowledged {
        /// Number of requests the caller supplied.
        request_count: usize,
        /// The requests that were sent, in their original order.
        processed_requests: Vec<WriteRequest>,
        inserted_count: i64,
        matched_count: i64,
        deleted_count: i64,
        /// `None` when a server did not report how many documents were modified.
        modified_count: Option<i64>,
        upserts: Vec<BulkWriteUpsert>,
    },
    /// The writes were sent without acknowledgement, so nothing is known about their outcome.
    Unacknowledged {
        request_count: usize,
        processed_requests: Vec<WriteRequest>,
    },
}

impl BulkWriteOperationResult {
    /// Whether the server reported the outcome of the writes.
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged { .. })
    }

    /// Number of requests the caller supplied.
    pub fn request_count(&self) -> usize {
        match self {
            Self::Acknowledged { request_count, .. } | Self::Unacknowledged { request_count, .. } => {
                *request_count
            }
        }
    }

    /// The requests that were sent.
    pub fn processed_requests(&self) -> &[WriteRequest] {
        match self {
            Self::Acknowledged {
                processed_requests, ..
            }
            | Self::Unacknowledged {
                processed_requests, ..
            } => processed_requests,
        }
    }

    pub fn inserted_count(&self) -> Option<i64> {
        match self {
            Self::Acknowledged { inserted_count, .. } => Some(*inserted_count),
            Self::Unacknowledged { .. } => None,
        }
    }

    pub fn matched_count(&self) -> Option<i64> {
        match self {
            Self::Acknowledged { matched_count, .. } => Some(*matched_count),
            Self::Unacknowledged { .. } => None,
        }
    }

    pub fn deleted_count(&self) -> Option<i64> {
        match self {
            Self::Acknowledged { deleted_count, .. } => Some(*deleted_count),
            Self::Unacknowledged { .. } => None,
        }
    }

    pub fn modified_count(&self) -> Option<i64> {
        match self {
            Self::Acknowledged { modified_count, .. } => *modified_count,
            Self::Unacknowledged { .. } => None,
        }
    }

    pub fn upserts(&self) -> &[BulkWriteUpsert] {
        match self {
            Self::Acknowledged { upserts, .. } => upserts,
            Self::Unacknowledged { .. } => &[],
        }
    }
}
