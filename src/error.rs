//! Contains the `Error` and `Result` types that `bulkwrite` uses.

mod bulk_write;

use std::{
    collections::HashSet,
    fmt::{self, Debug},
    sync::Arc,
};

use serde::Deserialize;
use thiserror::Error;

use crate::bson::Document;

pub use bulk_write::{BulkWriteError, PartialBulkWriteResult};

/// The result type for all methods that can return an error in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error label signifying that a write is safe to retry.
pub const RETRYABLE_WRITE_ERROR: &str = "RetryableWriteError";

/// An error label signifying that a failed retry did not apply any of the writes it carried.
pub(crate) const NO_WRITES_PERFORMED: &str = "NoWritesPerformed";

/// Server error codes that indicate a transient condition, making the failed write safe to send
/// again even when the server did not attach a label.
static RETRYABLE_WRITE_CODES: &[i32] = &[
    11600, 11602, 10107, 13435, 13436, 189, 91, 7, 6, 89, 9001, 262,
];

/// An error that can occur while compiling or executing a bulk write.
#[derive(Clone, Debug, Error)]
#[error("Kind: {kind}, labels: {labels:?}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,

    labels: HashSet<String>,

    /// The error that caused this one, if any. Populated when a batch fails for a reason beyond
    /// the individual writes it contains, e.g. a network failure partway through its replies.
    #[source]
    pub source: Option<Box<Error>>,
}

impl Error {
    /// Constructs an error from the given kind and optional labels.
    pub fn new(kind: ErrorKind, labels: Option<impl IntoIterator<Item = String>>) -> Self {
        let mut labels: HashSet<String> = labels
            .map(|labels| labels.into_iter().collect())
            .unwrap_or_default();
        if let ErrorKind::Command(ref command_error) = kind {
            labels.extend(command_error.error_labels.iter().cloned());
        }
        Self {
            kind: Box::new(kind),
            labels,
            source: None,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        ErrorKind::Internal {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn cancelled(message: impl Into<String>) -> Self {
        ErrorKind::Cancelled {
            message: message.into(),
        }
        .into()
    }

    /// Attaches the given error as this error's cause.
    pub(crate) fn with_source<E: Into<Option<Error>>>(mut self, source: E) -> Self {
        self.source = source.into().map(Box::new);
        self
    }

    /// Adds the given label to this error.
    pub fn with_label(mut self, label: impl AsRef<str>) -> Self {
        self.labels.insert(label.as_ref().to_string());
        self
    }

    /// The labels attached to this error, whether by the server or by the driver.
    pub fn labels(&self) -> &HashSet<String> {
        &self.labels
    }

    /// Whether this error contains the given label.
    pub fn contains_label<T: AsRef<str>>(&self, label: T) -> bool {
        self.labels().contains(label.as_ref())
    }

    /// The server-reported error code, if this error originated from a failed command.
    pub fn code(&self) -> Option<i32> {
        match self.kind.as_ref() {
            ErrorKind::Command(command_error) => Some(command_error.code),
            _ => None,
        }
    }

    pub(crate) fn is_network_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Io(_))
    }

    /// Whether this error was caused by the call's cancellation token firing.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Cancelled { .. })
            || self
                .source
                .as_ref()
                .is_some_and(|source| source.is_cancellation())
    }

    /// Whether a batch that failed to send with this error may be sent again.
    pub(crate) fn is_retryable_write(&self) -> bool {
        if self.contains_label(RETRYABLE_WRITE_ERROR) {
            return true;
        }
        if self.is_network_error() {
            return true;
        }
        match self.code() {
            Some(code) => RETRYABLE_WRITE_CODES.contains(&code),
            None => false,
        }
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Self::new(err.into(), None::<Vec<String>>)
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// The types of errors that can occur.
#[allow(missing_docs)]
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Wrapper around `bson::de::Error`.
    #[error("{0}")]
    BsonDeserialization(#[from] crate::bson::de::Error),

    /// Wrapper around `bson::ser::Error`.
    #[error("{0}")]
    BsonSerialization(#[from] crate::bson::ser::Error),

    /// One or more writes within a bulk write failed. Contains whatever partial result had been
    /// assembled when execution stopped.
    #[error("An error occurred when executing a bulk write: {0:?}")]
    BulkWrite(BulkWriteError),

    /// Execution was cancelled between batches or between replies. Any writes already
    /// acknowledged are reported via a [`BulkWriteError`] wrapping this error.
    #[error("bulk write cancelled: {message}")]
    #[non_exhaustive]
    Cancelled { message: String },

    /// The server rejected an entire command batch.
    #[error("{0}")]
    Command(CommandError),

    /// A single write was too large to fit in a command batch by itself, so no batch sequence
    /// could be formed. Detected before anything is sent.
    #[error(
        "the write at index {index} is {size} bytes, exceeding the {max_size} byte limit for a \
         single command batch"
    )]
    #[non_exhaustive]
    DocumentTooLarge {
        index: usize,
        size: usize,
        max_size: usize,
    },

    /// An internal invariant was violated; these indicate a bug rather than user error.
    #[error("Internal error: {message}")]
    #[non_exhaustive]
    Internal { message: String },

    /// An invalid argument was provided.
    #[error("An invalid argument was provided: {message}")]
    #[non_exhaustive]
    InvalidArgument { message: String },

    /// A write model failed validation during compilation. Nothing is sent to the server when
    /// any model is invalid.
    #[error("invalid write model provided at index {index}: {message}")]
    #[non_exhaustive]
    InvalidModel { index: usize, message: String },

    /// The server's reply to a batch could not be interpreted.
    #[error("The server returned an invalid response: {message}")]
    #[non_exhaustive]
    InvalidResponse { message: String },

    /// Wrapper around [`std::io::Error`].
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Wrapper around `bson::raw::Error`.
    #[error("{0}")]
    RawBson(#[from] crate::bson::raw::Error),
}

/// An error that occurred due to a database command failing.
#[derive(Clone, Debug, Deserialize)]
#[non_exhaustive]
pub struct CommandError {
    /// Identifies the type of error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: String,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg")]
    pub message: String,

    /// The error labels that the server returned.
    #[serde(rename = "errorLabels", default)]
    pub error_labels: Vec<String>,
}

impl fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Command failed: ({}): {}", self.code_name, self.message)
    }
}

/// An error that occurred during an individual write within a bulk write.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[non_exhaustive]
pub struct WriteError {
    /// Identifies the type of error.
    pub code: i32,

    /// The name associated with the error code.
    #[serde(rename = "codeName", default)]
    pub code_name: Option<String>,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg")]
    pub message: String,

    /// A document identifying the schema validation rules, if any, that the write violated.
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{CommandError, Error, ErrorKind, RETRYABLE_WRITE_ERROR};

    fn command_error(code: i32, labels: Vec<String>) -> Error {
        Error::new(
            ErrorKind::Command(CommandError {
                code,
                code_name: String::new(),
                message: "oops".to_string(),
                error_labels: labels,
            }),
            None::<Vec<String>>,
        )
    }

    #[test]
    fn network_errors_are_retryable() {
        let error: Error = ErrorKind::Io(Arc::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        )))
        .into();
        assert!(error.is_retryable_write());
    }

    #[test]
    fn labeled_errors_are_retryable_regardless_of_code() {
        let error = command_error(1, vec![RETRYABLE_WRITE_ERROR.to_string()]);
        assert!(error.contains_label(RETRYABLE_WRITE_ERROR));
        assert!(error.is_retryable_write());
    }

    #[test]
    fn transient_codes_are_retryable_without_labels() {
        // 91 is ShutdownInProgress, 11600 is InterruptedAtShutdown.
        assert!(command_error(91, vec![]).is_retryable_write());
        assert!(command_error(11600, vec![]).is_retryable_write());
    }

    #[test]
    fn other_errors_are_not_retryable() {
        assert!(!command_error(26, vec![]).is_retryable_write());
        assert!(!Error::invalid_argument("nope").is_retryable_write());
    }
}
