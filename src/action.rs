//! Action builders. Builders are returned by the methods on [`Client`](crate::Client); they can
//! be configured via chained methods and executed via `await`.

use std::future::IntoFuture;

mod bulk_write;

pub use bulk_write::BulkWrite;

pub(crate) mod private {
    pub trait Sealed {}
}

/// A pending call to execute against the server. The call can be configured via chained methods
/// and executed via `await`.
pub trait Action: private::Sealed + IntoFuture {
    /// If the value is `Some`, call the provided function on `self`. Convenient for chained
    /// updates with values that need to be set conditionally. For example:
    /// ```rust
    /// # use bulkwrite::{bson::Bson, error::Result, options::WriteModel, Client};
    /// use bulkwrite::action::Action;
    ///
    /// async fn write_all(
    ///     client: &Client,
    ///     models: Vec<WriteModel>,
    ///     comment: Option<Bson>,
    /// ) -> Result<()> {
    ///     client
    ///         .bulk_write(models)
    ///         .optional(comment, |action, comment| action.comment(comment))
    ///         .await?;
    ///     Ok(())
    /// }
    /// ```
    fn optional<Value>(self, value: Option<Value>, f: impl FnOnce(Self, Value) -> Self) -> Self
    where
        Self: Sized,
    {
        match value {
            Some(value) => f(self, value),
            None => self,
        }
    }
}
