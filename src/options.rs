//! Contains the write models and options used to configure a bulk write.

mod bulk_write;

pub use self::bulk_write::{BulkWriteOptions, UpdateModifications, WriteModel};
pub(crate) use self::bulk_write::OperationType;
pub use crate::concern::{Acknowledgment, WriteConcern};
