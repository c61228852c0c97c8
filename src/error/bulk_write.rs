use std::collections::HashMap;

use serde::Serialize;

use crate::{
    error::WriteError,
    results::{BulkWriteResult, SummaryBulkWriteResult, VerboseBulkWriteResult},
};

/// The error type for bulk write operations.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct BulkWriteError {
    /// The errors that occurred during individual writes, keyed by each write's index in the
    /// list provided to the call.
    pub write_errors: HashMap<usize, WriteError>,

    /// The results of any successful writes that were performed before the error occurred.
    pub partial_result: Option<PartialBulkWriteResult>,
}

impl BulkWriteError {
    pub(crate) fn merge(&mut self, other: Self) {
        self.write_errors.extend(other.write_errors);
        self.merge_partial_results(other.partial_result);
    }

    pub(crate) fn merge_partial_results(
        &mut self,
        other_partial_result: Option<PartialBulkWriteResult>,
    ) {
        match (self.partial_result.as_mut(), other_partial_result) {
            (Some(self_partial_result), Some(other_partial_result)) => {
                self_partial_result.merge(other_partial_result)
            }
            (None, Some(other_partial_result)) => self.partial_result = Some(other_partial_result),
            _ => {}
        }
    }
}

/// The results of a bulk write operation that experienced an error.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum PartialBulkWriteResult {
    /// The results of a summary bulk write.
    Summary(SummaryBulkWriteResult),

    /// The results of a verbose bulk write.
    Verbose(VerboseBulkWriteResult),
}

impl PartialBulkWriteResult {
    pub(crate) fn merge(&mut self, other: Self) {
        match (self, other) {
            (Self::Summary(this), Self::Summary(other)) => this.merge(other),
            (Self::Verbose(this), Self::Verbose(other)) => this.merge(other),
            // The operation execution path makes this an unreachable state
            _ => {}
        }
    }
}
