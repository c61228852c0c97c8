use crate::{
    bson::{oid::ObjectId, rawdoc, Bson, Document, RawDocumentBuf},
    error::{ErrorKind, Result},
};

/// The first key of the document, in serialization order.
pub(crate) fn first_key(document: &Document) -> Option<&str> {
    document.keys().next().map(String::as_str)
}

/// Verifies that the given document is a valid update document, i.e. that its top-level keys are
/// all update operators.
pub(crate) fn update_document_check(update: &Document) -> Result<()> {
    match first_key(update) {
        Some(key) if key.starts_with('$') => Ok(()),
        _ => Err(ErrorKind::InvalidArgument {
            message: "update document must have first key starting with '$'".to_string(),
        }
        .into()),
    }
}

/// Verifies that the given document is a valid replacement document, i.e. that it does not
/// contain update operators.
pub(crate) fn replacement_document_check(replacement: &Document) -> Result<()> {
    match first_key(replacement) {
        Some(key) if !key.starts_with('$') => Ok(()),
        _ => Err(ErrorKind::InvalidArgument {
            message: "replace document must have first key not starting with '$'".to_string(),
        }
        .into()),
    }
}

/// Adds the fields of `other` to the end of `doc`.
pub(crate) fn extend_raw_document_buf(
    doc: &mut RawDocumentBuf,
    other: RawDocumentBuf,
) -> Result<()> {
    for result in other.iter() {
        let (key, value) = result?;
        doc.append(key, value.to_raw_bson());
    }
    Ok(())
}

/// Returns the `_id` field of the given document, prepending a generated `ObjectId` `_id` to the
/// document if one is not already present.
pub(crate) fn get_or_prepend_id_field(doc: &mut RawDocumentBuf) -> Result<Bson> {
    match doc.get("_id")? {
        Some(id) => Ok(id.try_into()?),
        None => {
            let id = ObjectId::new();
            let mut new_doc = rawdoc! { "_id": id };
            extend_raw_document_buf(&mut new_doc, doc.clone())?;
            *doc = new_doc;
            Ok(Bson::ObjectId(id))
        }
    }
}
