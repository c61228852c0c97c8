//! Compilation of write models into command batches and interpretation of their replies.

pub(crate) mod bulk_write;

// The amount of overhead bytes to account for when building a document sequence.
pub(crate) const COMMAND_OVERHEAD_SIZE: usize = 16_000;

/// Whether a command is safe to send again after a transient failure.
#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) enum Retryability {
    Write,
    None,
}
