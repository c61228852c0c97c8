//! This crate contains the write path of an asynchronous MongoDB-style database driver: it
//! compiles a heterogeneous list of write models into `bulkWrite` command batches that respect
//! the connected server's size limits, executes those batches over a caller-supplied
//! [`Connection`](conn::Connection), and reassembles the per-operation replies into a single
//! result or error for the whole call.
//!
//! # Executing bulk writes
//!
//! Construct a [`Client`] around a [`Connection`](conn::Connection) implementation and call
//! [`Client::bulk_write`] with any mix of write models. The returned action can be configured
//! with chained methods and executed via `await`:
//!
//! ```no_run
//! # use bulkwrite::{error::Result, Client, Namespace, options::WriteModel};
//! # use bulkwrite::bson::doc;
//! # async fn run(client: Client) -> Result<()> {
//! let models = vec![
//!     WriteModel::InsertOne {
//!         namespace: Namespace::new("db", "events"),
//!         document: doc! { "kind": "signup" },
//!     },
//!     WriteModel::DeleteMany {
//!         namespace: Namespace::new("db", "stale"),
//!         filter: doc! { "expired": true },
//!         collation: None,
//!         hint: None,
//!     },
//! ];
//! let result = client.bulk_write(models).ordered(false).await?;
//! println!("inserted {}, deleted {}", result.inserted_count, result.deleted_count);
//! # Ok(())
//! # }
//! ```
//!
//! Calling [`verbose_results`](action::BulkWrite::verbose_results) on the action switches the
//! return type to a result containing the outcome of each individual write in addition to the
//! summary counts.

#![warn(missing_docs)]

pub use ::bson;

pub mod action;
mod bson_util;
mod checked;
mod client;
mod concern;
pub mod conn;
mod cursor;
pub mod error;
mod namespace;
mod operation;
pub mod options;
pub mod results;
mod serde_util;
#[cfg(test)]
mod test;
mod trace;

pub use crate::{
    client::{Client, ClientOptions},
    namespace::Namespace,
};

/// A boxed future returned by the asynchronous interfaces in this crate.
pub use futures_core::future::BoxFuture;
