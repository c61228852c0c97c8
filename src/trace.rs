use crate::bson::{Bson, Document};

/// The tracing target for events describing commands sent to the server.
pub(crate) const COMMAND_TRACING_EVENT_TARGET: &str = "bulkwrite::command";

/// The default max length for extended JSON documents in tracing events.
pub(crate) const DEFAULT_MAX_DOCUMENT_LENGTH_BYTES: usize = 1000;

pub(crate) trait TracingRepresentation {
    type Representation;

    fn tracing_representation(&self) -> Self::Representation;
}

impl TracingRepresentation for Document {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        Bson::Document(self.clone()).into_relaxed_extjson().to_string()
    }
}

impl TracingRepresentation for crate::error::Error {
    type Representation = String;

    fn tracing_representation(&self) -> String {
        self.to_string()
    }
}

pub(crate) fn serialize_command_or_reply(doc: Document, max_length_bytes: usize) -> String {
    let mut ext_json = doc.tracing_representation();
    truncate_on_char_boundary(&mut ext_json, max_length_bytes);
    ext_json
}

/// Truncates the given string at the closest UTF-8 character boundary >= the provided length.
/// If the new length is >= the current length, does nothing.
pub(crate) fn truncate_on_char_boundary(s: &mut String, new_len: usize) {
    let mut truncate_index = new_len;
    if s.len() > new_len {
        while !s.is_char_boundary(truncate_index) {
            truncate_index += 1;
        }
        s.truncate(truncate_index)
    }
}

#[cfg(test)]
mod tests {
    use super::truncate_on_char_boundary;

    #[test]
    fn truncation_lands_on_character_boundaries() {
        let mut s = "hello".to_string();
        truncate_on_char_boundary(&mut s, 3);
        assert_eq!(s, "hel");

        // A multi-byte character cannot be split.
        let mut s = "héllo".to_string();
        truncate_on_char_boundary(&mut s, 2);
        assert_eq!(s, "hé");

        let mut s = "hi".to_string();
        truncate_on_char_boundary(&mut s, 10);
        assert_eq!(s, "hi");
    }
}
