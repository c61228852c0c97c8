use std::{collections::VecDeque, sync::Mutex};

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::{
    bson::RawDocumentBuf,
    conn::{Command, Connection, ReplyCursor, ReplyStream, StreamDescription},
    error::{Error, Result},
    BoxFuture,
};

/// The outcome scripted for one send of a command batch. Outcomes are consumed in order, one per
/// send; a send with no remaining outcome panics the test.
pub(super) enum SendOutcome {
    /// Accept the command and stream the scripted replies.
    Replies(Vec<ReplyScript>),
    /// Reject the command outright with the given error.
    Failure(Error),
}

/// One entry in the scripted reply stream of an accepted command.
pub(super) enum ReplyScript {
    /// Yield the given reply document.
    Reply(RawDocumentBuf),
    /// Yield the given reply document, then fire the given token.
    ReplyThenCancel(RawDocumentBuf, CancellationToken),
    /// Fail the stream with the given error.
    Error(Error),
}

/// A [`Connection`] that replays scripted outcomes and records every command it is asked to send.
/// Wrap one in an [`Arc`](std::sync::Arc) to keep a handle for assertions after the client takes
/// ownership.
pub(super) struct MockConnection {
    description: StreamDescription,
    script: Mutex<VecDeque<SendOutcome>>,
    sent: Mutex<Vec<Command>>,
}

impl MockConnection {
    pub(super) fn new(description: StreamDescription) -> Self {
        Self {
            description,
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Scripts the outcome of the next unscripted send.
    pub(super) fn expect_send(&self, outcome: SendOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// The commands sent over this connection so far, in order.
    pub(super) fn sent_commands(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }
}

impl Connection for MockConnection {
    fn stream_description(&self) -> &StreamDescription {
        &self.description
    }

    fn send<'a>(&'a self, command: &'a Command) -> BoxFuture<'a, Result<ReplyStream>> {
        self.sent.lock().unwrap().push(command.clone());
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("no outcome scripted for {} command", command.name));
        async move {
            match outcome {
                SendOutcome::Replies(replies) => {
                    Ok(Box::new(ScriptedReplies::new(replies)) as ReplyStream)
                }
                SendOutcome::Failure(error) => Err(error),
            }
        }
        .boxed()
    }
}

struct ScriptedReplies {
    replies: VecDeque<ReplyScript>,
}

impl ScriptedReplies {
    fn new(replies: Vec<ReplyScript>) -> Self {
        Self {
            replies: replies.into(),
        }
    }
}

impl ReplyCursor for ScriptedReplies {
    fn next_reply(&mut self) -> BoxFuture<'_, Result<Option<RawDocumentBuf>>> {
        let next = self.replies.pop_front();
        async move {
            match next {
                Some(ReplyScript::Reply(reply)) => Ok(Some(reply)),
                Some(ReplyScript::ReplyThenCancel(reply, token)) => {
                    token.cancel();
                    Ok(Some(reply))
                }
                Some(ReplyScript::Error(error)) => Err(error),
                None => Ok(None),
            }
        }
        .boxed()
    }
}
