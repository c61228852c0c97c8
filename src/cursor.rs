use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::{conn::ReplyStream, error::Result};

/// A typed view over the reply stream of one command batch. Replies are deserialized lazily as
/// the stream is advanced, so a failure partway through leaves the already-observed replies
/// intact.
pub(crate) struct Cursor<T> {
    stream: ReplyStream,
    exhausted: bool,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Cursor<T> {
    pub(crate) fn new(stream: ReplyStream) -> Self {
        Self {
            stream,
            exhausted: false,
            _phantom: PhantomData,
        }
    }

    /// Deserializes and returns the next reply, or `None` once the stream is exhausted.
    pub(crate) async fn try_next(&mut self) -> Result<Option<T>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.stream.next_reply().await? {
            Some(reply) => Ok(Some(crate::bson::from_slice(reply.as_bytes())?)),
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }
}
