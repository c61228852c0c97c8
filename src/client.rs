use std::{fmt, sync::Arc, time::Instant};

use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::{
    conn::{Command, Connection, ReplyStream, StreamDescription},
    error::{Error, Result, NO_WRITES_PERFORMED},
    operation::Retryability,
    trace::{
        serialize_command_or_reply,
        TracingRepresentation,
        COMMAND_TRACING_EVENT_TARGET,
        DEFAULT_MAX_DOCUMENT_LENGTH_BYTES,
    },
};

/// The entry point to the crate: a handle that executes bulk write calls over a [`Connection`].
///
/// `Client` uses [`std::sync::Arc`] internally, so it can safely be shared across tasks by
/// cloning; each call owns its own compilation and batching state, so concurrent calls never
/// contend with each other.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    connection: Box<dyn Connection>,
    options: ClientOptions,
}

impl Client {
    /// Creates a new `Client` over the given connection with default options.
    pub fn new(connection: impl Connection + 'static) -> Self {
        Self::with_options(connection, ClientOptions::default())
    }

    /// Creates a new `Client` over the given connection with the given options.
    pub fn with_options(connection: impl Connection + 'static, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                connection: Box::new(connection),
                options,
            }),
        }
    }

    pub(crate) fn stream_description(&self) -> &StreamDescription {
        self.inner.connection.stream_description()
    }

    pub(crate) fn retry_writes(&self) -> bool {
        self.inner.options.retry_writes != Some(false)
    }

    fn tracing_max_document_length_bytes(&self) -> usize {
        self.inner
            .options
            .tracing_max_document_length_bytes
            .unwrap_or(DEFAULT_MAX_DOCUMENT_LENGTH_BYTES)
    }

    /// Sends the given command, retrying it once if the first attempt fails with a transient
    /// error and both the client options and the command's contents permit a retry. The command
    /// is reused as-is, so a retried attempt is byte-for-byte identical to the first.
    pub(crate) async fn send_with_retry(
        &self,
        command: &Command,
        retryability: Retryability,
        token: &CancellationToken,
    ) -> Result<ReplyStream> {
        if token.is_cancelled() {
            return Err(Error::cancelled("bulk write cancelled before sending a batch"));
        }

        let can_retry = self.retry_writes() && retryability == Retryability::Write;

        let first_error = match self.send_traced(command).await {
            Ok(stream) => return Ok(stream),
            Err(error) => error,
        };

        if !can_retry || !first_error.is_retryable_write() || token.is_cancelled() {
            return Err(first_error);
        }

        tracing::debug!(
            target: COMMAND_TRACING_EVENT_TARGET,
            commandName = command.name,
            "Retrying command"
        );

        match self.send_traced(command).await {
            Ok(stream) => Ok(stream),
            // Prefer the retry's error unless the server reported that the retry performed no
            // writes, in which case the first error describes what actually happened.
            Err(retry_error) => {
                if retry_error.contains_label(NO_WRITES_PERFORMED) {
                    Err(first_error)
                } else {
                    Err(retry_error)
                }
            }
        }
    }

    async fn send_traced(&self, command: &Command) -> Result<ReplyStream> {
        if tracing::enabled!(target: COMMAND_TRACING_EVENT_TARGET, tracing::Level::DEBUG) {
            tracing::debug!(
                target: COMMAND_TRACING_EVENT_TARGET,
                command = serialize_command_or_reply(
                    command.get_command_document(),
                    self.tracing_max_document_length_bytes(),
                ),
                databaseName = command.target_db,
                commandName = command.name,
                "Command started"
            );
        }

        let start_time = Instant::now();
        let result = self.inner.connection.send(command).await;
        let duration = start_time.elapsed();

        match &result {
            Ok(_) => {
                tracing::debug!(
                    target: COMMAND_TRACING_EVENT_TARGET,
                    commandName = command.name,
                    durationMS = duration.as_millis(),
                    "Command succeeded"
                );
            }
            Err(error) => {
                tracing::debug!(
                    target: COMMAND_TRACING_EVENT_TARGET,
                    commandName = command.name,
                    failure = error.tracing_representation(),
                    durationMS = duration.as_millis(),
                    "Command failed"
                );
            }
        }

        result
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

/// Contains the options that can be used to create a new [`Client`].
#[derive(Clone, Debug, Default, TypedBuilder)]
#[non_exhaustive]
pub struct ClientOptions {
    /// Whether the client should retry a batch when it fails with a transient error.
    ///
    /// The default value is true.
    #[builder(default, setter(strip_option))]
    pub retry_writes: Option<bool>,

    /// The maximum number of bytes of a command's extended JSON representation to include in a
    /// tracing event before truncating. Defaults to 1000.
    #[builder(default, setter(strip_option))]
    pub tracing_max_document_length_bytes: Option<usize>,
}
