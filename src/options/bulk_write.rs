#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{
    bson::{rawdoc, Array, Bson, Document, RawDocumentBuf},
    bson_util::{get_or_prepend_id_field, replacement_document_check, update_document_check},
    error::Result,
    options::WriteConcern,
    serde_util::serialize_bool_or_true,
    Namespace,
};

/// Options shared by every write in a bulk write call. These are serialized into the body of
/// each command batch, so every batch of one call carries identical options.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct BulkWriteOptions {
    /// Whether the writes must be executed in the order provided and execution must halt at the
    /// first write error. Defaults to `true`.
    #[serialize_always]
    #[serde(serialize_with = "serialize_bool_or_true")]
    pub ordered: Option<bool>,

    /// Whether document-level validation should be skipped for all writes in this call.
    pub bypass_document_validation: Option<bool>,

    /// An arbitrary comment attached to each command batch for server-side log correlation.
    pub comment: Option<Bson>,

    /// A map of parameter names to values that can be referenced in the filters and updates of
    /// the call via `$$` variable syntax.
    #[serde(rename = "let")]
    pub let_vars: Option<Document>,

    /// The write concern the server should apply to the call.
    pub write_concern: Option<WriteConcern>,
}

/// A single write to execute as part of a bulk write call. Each model targets a namespace of its
/// own, so one call can mix writes against any number of collections.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum WriteModel {
    /// Inserts the given document. If the document does not contain an `_id` field, one is
    /// generated client-side so the inserted key can be reported in the call's results.
    InsertOne {
        #[serde(skip)]
        namespace: Namespace,
        document: Document,
    },

    /// Applies update operators to the first document matching `filter`.
    #[serde(rename_all = "camelCase")]
    UpdateOne {
        #[serde(skip)]
        namespace: Namespace,
        filter: Document,
        #[serde(rename = "updateMods")]
        update: UpdateModifications,
        array_filters: Option<Array>,
        collation: Option<Document>,
        hint: Option<Bson>,
        upsert: Option<bool>,
    },

    /// Applies update operators to every document matching `filter`.
    #[serde(rename_all = "camelCase")]
    UpdateMany {
        #[serde(skip)]
        namespace: Namespace,
        filter: Document,
        #[serde(rename = "updateMods")]
        update: UpdateModifications,
        array_filters: Option<Array>,
        collation: Option<Document>,
        hint: Option<Bson>,
        upsert: Option<bool>,
    },

    /// Replaces the first document matching `filter` with `replacement` in its entirety.
    #[serde(rename_all = "camelCase")]
    ReplaceOne {
        #[serde(skip)]
        namespace: Namespace,
        filter: Document,
        #[serde(rename = "updateMods")]
        replacement: Document,
        collation: Option<Document>,
        hint: Option<Bson>,
        upsert: Option<bool>,
    },

    /// Deletes the first document matching `filter`.
    DeleteOne {
        #[serde(skip)]
        namespace: Namespace,
        filter: Document,
        collation: Option<Document>,
        hint: Option<Bson>,
    },

    /// Deletes every document matching `filter`.
    DeleteMany {
        #[serde(skip)]
        namespace: Namespace,
        filter: Document,
        collation: Option<Document>,
        hint: Option<Bson>,
    },
}

pub(crate) enum OperationType {
    Insert,
    Update,
    Delete,
}

impl WriteModel {
    pub(crate) fn namespace(&self) -> &Namespace {
        match self {
            Self::InsertOne { namespace, .. } => namespace,
            Self::UpdateOne { namespace, .. } => namespace,
            Self::UpdateMany { namespace, .. } => namespace,
            Self::ReplaceOne { namespace, .. } => namespace,
            Self::DeleteOne { namespace, .. } => namespace,
            Self::DeleteMany { namespace, .. } => namespace,
        }
    }

    pub(crate) fn operation_type(&self) -> OperationType {
        match self {
            Self::InsertOne { .. } => OperationType::Insert,
            Self::UpdateOne { .. } | Self::UpdateMany { .. } | Self::ReplaceOne { .. } => {
                OperationType::Update
            }
            Self::DeleteOne { .. } | Self::DeleteMany { .. } => OperationType::Delete,
        }
    }

    /// Whether this operation should apply to all documents that match the filter. Returns None
    /// if the operation does not use a filter.
    pub(crate) fn multi(&self) -> Option<bool> {
        match self {
            Self::UpdateMany { .. } | Self::DeleteMany { .. } => Some(true),
            Self::UpdateOne { .. } | Self::ReplaceOne { .. } | Self::DeleteOne { .. } => {
                Some(false)
            }
            Self::InsertOne { .. } => None,
        }
    }

    /// The command field under which this model's entry appears in the ops payload.
    pub(crate) fn operation_name(&self) -> &'static str {
        match self.operation_type() {
            OperationType::Insert => "insert",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }

    /// Returns the operation-specific fields that should be included in this model's entry in the
    /// ops payload. Also returns an inserted ID if this is an insert operation.
    pub(crate) fn get_ops_document_contents(&self) -> Result<(RawDocumentBuf, Option<Bson>)> {
        if let Self::UpdateOne { update, .. } | Self::UpdateMany { update, .. } = self {
            if let UpdateModifications::Document(update_document) = update {
                update_document_check(update_document)?;
            }
        } else if let Self::ReplaceOne { replacement, .. } = self {
            replacement_document_check(replacement)?;
        }

        let (mut model_document, inserted_id) = match self {
            Self::InsertOne { document, .. } => {
                let mut insert_document = RawDocumentBuf::from_document(document)?;
                let inserted_id = get_or_prepend_id_field(&mut insert_document)?;
                (rawdoc! { "document": insert_document }, Some(inserted_id))
            }
            _ => {
                let model_document = crate::bson::to_raw_document_buf(&self)?;
                (model_document, None)
            }
        };

        if let Some(multi) = self.multi() {
            model_document.append("multi", multi);
        }

        Ok((model_document, inserted_id))
    }
}

/// Enum modeling the modifications to apply during an update. For details, see the official
/// MongoDB [documentation](https://www.mongodb.com/docs/manual/reference/command/update/#update-command-behaviors).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum UpdateModifications {
    /// A document that contains only update operator expressions.
    Document(Document),

    /// An aggregation pipeline.
    Pipeline(Vec<Document>),
}

impl From<Document> for UpdateModifications {
    fn from(item: Document) -> Self {
        UpdateModifications::Document(item)
    }
}

impl From<Vec<Document>> for UpdateModifications {
    fn from(item: Vec<Document>) -> Self {
        UpdateModifications::Pipeline(item)
    }
}

#[cfg(test)]
mod tests {
    use super::WriteModel;
    use crate::{
        bson::{doc, rawdoc},
        Namespace,
    };

    #[test]
    fn update_entries_carry_multi() {
        let model = WriteModel::UpdateMany {
            namespace: Namespace::new("db", "coll"),
            filter: doc! { "a": 1 },
            update: doc! { "$inc": { "a": 1 } }.into(),
            array_filters: None,
            collation: None,
            hint: None,
            upsert: None,
        };
        let (contents, inserted_id) = model.get_ops_document_contents().unwrap();
        assert!(inserted_id.is_none());
        assert_eq!(
            contents,
            rawdoc! {
                "filter": { "a": 1 },
                "updateMods": { "$inc": { "a": 1 } },
                "multi": true,
            }
        );
    }

    #[test]
    fn delete_one_entries_carry_multi_false() {
        let model = WriteModel::DeleteOne {
            namespace: Namespace::new("db", "coll"),
            filter: doc! { "a": 1 },
            collation: None,
            hint: None,
        };
        let (contents, _) = model.get_ops_document_contents().unwrap();
        assert_eq!(contents, rawdoc! { "filter": { "a": 1 }, "multi": false });
    }

    #[test]
    fn insert_entries_have_no_multi() {
        let model = WriteModel::InsertOne {
            namespace: Namespace::new("db", "coll"),
            document: doc! { "_id": 1 },
        };
        let (contents, inserted_id) = model.get_ops_document_contents().unwrap();
        assert_eq!(inserted_id, Some(crate::bson::Bson::Int32(1)));
        assert!(contents.get("multi").unwrap().is_none());
        let document = contents.get_document("document").unwrap();
        assert_eq!(document.as_bytes(), rawdoc! { "_id": 1 }.as_bytes());
    }
}
