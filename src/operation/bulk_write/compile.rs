use std::collections::HashMap;

use crate::{
    bson::{rawdoc, Bson, RawDocumentBuf},
    checked::Checked,
    error::{Error, ErrorKind, Result},
    options::WriteModel,
    Namespace,
};

/// A write model compiled down to the documents that represent it on the wire.
#[derive(Debug)]
pub(crate) struct CompiledWrite<'a> {
    /// The model this write was compiled from.
    pub(crate) model: &'a WriteModel,

    /// The index of this write's namespace in the call-wide namespace table.
    pub(crate) namespace_index: usize,

    /// The operation-specific fields of this write's ops entry. The full entry is formed during
    /// batch planning by prefixing these with the operation-name field, whose value is the
    /// batch-local namespace index.
    pub(crate) payload: RawDocumentBuf,

    /// The `_id` of the document this write inserts, if it is an insert. Remembered so that
    /// insert results can report the key, which the server does not echo back.
    pub(crate) inserted_id: Option<Bson>,
}

impl CompiledWrite<'_> {
    /// The serialized size of this write's full ops entry. Must agree exactly with the entries
    /// built during batch planning: the payload fields plus an operation-name field carrying an
    /// int32 namespace index.
    pub(crate) fn entry_size(&self) -> Result<usize> {
        // element type byte + name + nul terminator + int32
        let name_field_size = Checked::new(self.model.operation_name().len()) + 6;
        (name_field_size + self.payload.as_bytes().len()).get()
    }
}

/// The call-wide namespace table: each distinct namespace referenced by the call, in order of
/// first reference, with its serialized nsInfo entry.
#[derive(Debug)]
pub(crate) struct NamespaceInfo<'a> {
    /// The nsInfo entry documents, in first-reference order.
    pub(crate) entries: Vec<RawDocumentBuf>,
    // Cache the namespaces and their indexes to avoid traversing the entry list each time a
    // namespace is looked up or added.
    cache: HashMap<&'a Namespace, usize>,
}

impl<'a> NamespaceInfo<'a> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            cache: HashMap::new(),
        }
    }

    /// Gets the index for the given namespace in the table, adding an entry if one is not
    /// already present.
    fn get_index(&mut self, namespace: &'a Namespace) -> usize {
        match self.cache.get(namespace) {
            Some(index) => *index,
            None => {
                self.entries.push(rawdoc! { "ns": namespace.to_string() });
                let next_index = self.cache.len();
                self.cache.insert(namespace, next_index);
                next_index
            }
        }
    }
}

/// Compiles each model into its wire form, assigning namespace indices in order of first
/// reference and generating `_id`s for inserts that lack one. Fails, before anything reaches the
/// network, if any model is malformed or too large to send in a batch by itself.
pub(crate) fn compile_writes<'a>(
    models: &'a [WriteModel],
    max_entry_size: usize,
) -> Result<(Vec<CompiledWrite<'a>>, NamespaceInfo<'a>)> {
    let mut namespaces = NamespaceInfo::new();
    let mut writes = Vec::with_capacity(models.len());

    for (index, model) in models.iter().enumerate() {
        let (payload, inserted_id) = model
            .get_ops_document_contents()
            .map_err(|error| locate(error, index))?;
        let namespace_index = namespaces.get_index(model.namespace());

        let write = CompiledWrite {
            model,
            namespace_index,
            payload,
            inserted_id,
        };

        // A batch containing only this write must accommodate both its ops entry and its nsInfo
        // entry.
        let namespace_size = namespaces.entries[namespace_index].as_bytes().len();
        let footprint = (Checked::new(write.entry_size()?) + namespace_size).get()?;
        if footprint > max_entry_size {
            return Err(ErrorKind::DocumentTooLarge {
                index,
                size: footprint,
                max_size: max_entry_size,
            }
            .into());
        }

        writes.push(write);
    }

    Ok((writes, namespaces))
}

/// Attributes a validation failure to the model it arose from.
fn locate(error: Error, index: usize) -> Error {
    match *error.kind {
        ErrorKind::InvalidArgument { message } => ErrorKind::InvalidModel { index, message }.into(),
        _ => error,
    }
}

#[cfg(test)]
mod tests {
    use super::compile_writes;
    use crate::{
        bson::{doc, Bson},
        error::ErrorKind,
        options::WriteModel,
        Namespace,
    };

    fn insert(ns: &Namespace, document: crate::bson::Document) -> WriteModel {
        WriteModel::InsertOne {
            namespace: ns.clone(),
            document,
        }
    }

    #[test]
    fn namespaces_are_indexed_in_first_reference_order() {
        let orders = Namespace::new("shop", "orders");
        let users = Namespace::new("shop", "users");
        let models = vec![
            insert(&orders, doc! { "_id": 1 }),
            insert(&users, doc! { "_id": 2 }),
            insert(&orders, doc! { "_id": 3 }),
            insert(&users, doc! { "_id": 4 }),
        ];

        let (writes, namespaces) = compile_writes(&models, usize::MAX).unwrap();

        let indices: Vec<_> = writes.iter().map(|write| write.namespace_index).collect();
        assert_eq!(indices, vec![0, 1, 0, 1]);

        let entries: Vec<_> = namespaces
            .entries
            .iter()
            .map(|entry| entry.get_str("ns").unwrap().to_string())
            .collect();
        assert_eq!(entries, vec!["shop.orders", "shop.users"]);
    }

    #[test]
    fn inserts_without_keys_get_generated_ids() {
        let ns = Namespace::new("db", "coll");
        let models = vec![insert(&ns, doc! { "x": 1 })];

        let (writes, _) = compile_writes(&models, usize::MAX).unwrap();
        assert!(matches!(writes[0].inserted_id, Some(Bson::ObjectId(_))));

        let document = writes[0].payload.get_document("document").unwrap();
        assert!(document.get("_id").unwrap().is_some());
    }

    #[test]
    fn compilation_is_deterministic_for_explicit_ids() {
        let ns = Namespace::new("db", "coll");
        let models = vec![
            insert(&ns, doc! { "_id": 1, "a": "first" }),
            insert(&ns, doc! { "_id": 2, "a": "second" }),
        ];

        let (first, _) = compile_writes(&models, usize::MAX).unwrap();
        let (second, _) = compile_writes(&models, usize::MAX).unwrap();
        for (left, right) in first.iter().zip(second.iter()) {
            assert_eq!(left.payload.as_bytes(), right.payload.as_bytes());
            assert_eq!(left.namespace_index, right.namespace_index);
        }
    }

    #[test]
    fn invalid_models_are_reported_with_their_index() {
        let ns = Namespace::new("db", "coll");
        let models = vec![
            insert(&ns, doc! { "_id": 1 }),
            insert(&ns, doc! { "_id": 2 }),
            WriteModel::UpdateOne {
                namespace: ns.clone(),
                filter: doc! {},
                update: doc! { "a": 1 }.into(),
                array_filters: None,
                collation: None,
                hint: None,
                upsert: None,
            },
        ];

        let error = compile_writes(&models, usize::MAX).unwrap_err();
        match *error.kind {
            ErrorKind::InvalidModel { index, .. } => assert_eq!(index, 2),
            ref other => panic!("expected InvalidModel, got {:?}", other),
        }
    }

    #[test]
    fn oversized_writes_fail_compilation() {
        let ns = Namespace::new("db", "coll");
        let models = vec![
            insert(&ns, doc! { "_id": 1 }),
            insert(&ns, doc! { "_id": 2, "payload": "x".repeat(500) }),
        ];

        let error = compile_writes(&models, 400).unwrap_err();
        match *error.kind {
            ErrorKind::DocumentTooLarge {
                index,
                size,
                max_size,
            } => {
                assert_eq!(index, 1);
                assert_eq!(max_size, 400);
                assert!(size > max_size);
            }
            ref other => panic!("expected DocumentTooLarge, got {:?}", other),
        }
    }
}
