use serde::Deserialize;

use crate::{bson::Bson, error::WriteError};

/// The reply to a single operation within a batch.
#[derive(Debug, Deserialize)]
pub(super) struct SingleOperationResponse {
    /// The operation's index local to its batch.
    #[serde(rename = "idx")]
    pub(super) index: usize,
    #[serde(flatten)]
    pub(super) result: SingleOperationResult,
}

/// The non-index fields of a single operation's reply.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum SingleOperationResult {
    // This variant must be listed first for proper deserialization.
    Error(WriteError),
    #[serde(rename_all = "camelCase")]
    Success {
        n: u64,
        n_modified: Option<u64>,
        upserted: Option<UpsertedId>,
    },
}

/// The `_id` of an upserted document.
#[derive(Debug, Deserialize)]
pub(super) struct UpsertedId {
    #[serde(rename = "_id")]
    pub(super) id: Bson,
}
