//! Contains the types of results returned by write operations.

mod bulk_write;

use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::bson::Bson;

pub use bulk_write::{BulkWriteResult, SummaryBulkWriteResult, VerboseBulkWriteResult};

/// The result of an individual insert within a bulk write.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct InsertOneResult {
    /// The `_id` field of the document inserted. This is collected client-side when the write is
    /// compiled, since the server does not echo inserted keys back.
    pub inserted_id: Bson,
}

/// The result of an individual update or replace within a bulk write.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UpdateResult {
    /// The number of documents that matched the filter.
    pub matched_count: u64,

    /// The number of documents that were modified by the operation.
    pub modified_count: u64,

    /// The `_id` field of the upserted document, present only if an upsert took place.
    pub upserted_id: Option<Bson>,
}

/// The result of an individual delete within a bulk write.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DeleteResult {
    /// The number of documents deleted by the operation.
    pub deleted_count: u64,
}
