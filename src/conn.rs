//! Contains the interfaces between the bulk write machinery and the transport that carries its
//! commands. Implement [`Connection`] to plug in an actual wire protocol; everything above
//! framing and authentication is handled by this crate.

use std::{fmt, sync::Arc};

use typed_builder::TypedBuilder;

use crate::{
    bson::{doc, Array, Document, RawDocumentBuf},
    error::Result,
    BoxFuture,
};

/// A stream over the per-operation replies produced by one command batch, in the order the
/// operations appeared in the batch.
pub trait ReplyCursor: Send {
    /// Retrieves the next reply document, or `None` once every reply for the batch has been
    /// observed. Errors are terminal; a cursor must not be polled again after returning one.
    fn next_reply(&mut self) -> BoxFuture<'_, Result<Option<RawDocumentBuf>>>;
}

impl fmt::Debug for dyn ReplyCursor + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplyCursor")
    }
}

/// The replies to a single command batch.
pub type ReplyStream = Box<dyn ReplyCursor>;

/// A connection to a server that can execute commands. Implementations own framing, transport,
/// and the parsing of top-level command failures; compiling, batching, retry, and reply
/// reconciliation are driven by [`Client`](crate::Client).
///
/// Commands are taken by reference so that a batch that fails with a transient error can be
/// retransmitted unchanged.
pub trait Connection: Send + Sync {
    /// The limits of the server this connection is attached to.
    fn stream_description(&self) -> &StreamDescription;

    /// Sends the given command, resolving with a handle to its replies once the server accepts
    /// it. A command the server rejects outright resolves with an error and yields no replies.
    fn send<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<ReplyStream>>;
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn stream_description(&self) -> &StreamDescription {
        (**self).stream_description()
    }

    fn send<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<ReplyStream>> {
        (**self).send(command)
    }
}

/// Contains information about the connected server in a format digestible by the bulk write
/// machinery. All limits default to the values advertised by a modern standalone server.
#[derive(Clone, Debug, TypedBuilder)]
#[non_exhaustive]
pub struct StreamDescription {
    /// The maximum size of writes (excluding command overhead) that should be sent to the
    /// server.
    #[builder(default = 16 * 1024 * 1024)]
    pub max_bson_object_size: i64,

    /// The maximum number of writes that can be included in a single command batch. If more than
    /// this number of writes were included, the server could not guarantee space in the response
    /// to reply to each of them.
    #[builder(default = 100_000)]
    pub max_write_batch_size: i64,

    /// The maximum permitted size of a BSON wire protocol message.
    #[builder(default = 48_000_000)]
    pub max_message_size_bytes: i32,
}

impl Default for StreamDescription {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A driver-side abstraction of a server command, containing all the information necessary to
/// serialize it to a wire message.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Command {
    /// The name of the command.
    pub name: String,

    /// The database the command targets.
    pub target_db: String,

    /// The main command document (OP_MSG payload type 0).
    pub body: RawDocumentBuf,

    /// Sequences of documents transmitted outside the body (OP_MSG payload type 1). Documents in
    /// a sequence are laid out back to back with no array indices, so their combined size is the
    /// sum of their individual sizes.
    pub document_sequences: Vec<DocumentSequence>,
}

impl Command {
    pub(crate) fn new(
        name: impl Into<String>,
        target_db: impl Into<String>,
        body: RawDocumentBuf,
    ) -> Self {
        Self {
            name: name.into(),
            target_db: target_db.into(),
            body,
            document_sequences: Vec::new(),
        }
    }

    pub(crate) fn add_document_sequence(
        &mut self,
        identifier: impl Into<String>,
        documents: Vec<RawDocumentBuf>,
    ) {
        self.document_sequences.push(DocumentSequence {
            identifier: identifier.into(),
            documents,
        });
    }

    /// Gets this command as a single `Document`, with any document sequences folded back into
    /// the body as arrays. If serialization fails, returns a document containing the error.
    pub fn get_command_document(&self) -> Document {
        let mut command = match self.body.to_document() {
            Ok(document) => document,
            Err(error) => return doc! { "serialization error": error.to_string() },
        };

        for document_sequence in &self.document_sequences {
            let mut documents = Array::new();
            for document in &document_sequence.documents {
                match document.to_document() {
                    Ok(document) => documents.push(document.into()),
                    Err(error) => return doc! { "serialization error": error.to_string() },
                }
            }
            command.insert(document_sequence.identifier.clone(), documents);
        }

        command
    }
}

/// A named sequence of documents attached to a command as an OP_MSG payload type 1 section.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct DocumentSequence {
    /// The command field the sequence stands in for.
    pub identifier: String,

    /// The documents of the sequence.
    pub documents: Vec<RawDocumentBuf>,
}
