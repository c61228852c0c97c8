//! Contains the types for write concerns.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

use crate::{
    error::{ErrorKind, Result},
    serde_util,
};

/// Specifies the level of acknowledgement requested from the server for a bulk write before the
/// replies are considered final.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder, Serialize, Deserialize)]
#[builder(field_defaults(default, setter(into)))]
#[non_exhaustive]
pub struct WriteConcern {
    /// Requests acknowledgment that the operation has propagated to a specific number or variety
    /// of servers.
    pub w: Option<Acknowledgment>,

    /// Specifies a time limit for the write concern. If an operation has not propagated to the
    /// requested level within the time limit, an error will return to the client with an error
    /// code.
    #[serde(rename = "wtimeout")]
    #[serde(serialize_with = "serde_util::serialize_duration_option_as_int_millis")]
    #[serde(deserialize_with = "serde_util::deserialize_duration_option_from_u64_millis")]
    #[serde(default)]
    pub w_timeout: Option<Duration>,

    /// Requests acknowledgment that the operation has been written to the on-disk journal.
    #[serde(rename = "j")]
    pub journal: Option<bool>,
}

impl WriteConcern {
    /// A write concern requesting acknowledgment from a majority of nodes.
    pub fn majority() -> Self {
        Acknowledgment::Majority.into()
    }

    /// Whether the server will respond to this write with per-operation replies. Unacknowledged
    /// writes (`w: 0` without journaling) produce no replies at all.
    pub fn is_acknowledged(&self) -> bool {
        self.w != Some(Acknowledgment::Nodes(0)) || self.journal == Some(true)
    }

    /// Validates that the write concern is consistent. A write concern is invalid if the `w`
    /// field is 0 and the `j` field is `true`.
    pub fn validate(&self) -> Result<()> {
        if self.w == Some(Acknowledgment::Nodes(0)) && self.journal == Some(true) {
            return Err(ErrorKind::InvalidArgument {
                message: "write concern cannot have w=0 and j=true".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl From<Acknowledgment> for WriteConcern {
    fn from(w: Acknowledgment) -> Self {
        WriteConcern::builder().w(w).build()
    }
}

/// The type of the `w` field in a write concern.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Acknowledgment {
    /// Requires acknowledgment that the write has reached the specified number of nodes.
    ///
    /// Note: specifying 0 here indicates that the write is unacknowledged, which is not
    /// supported for bulk writes since the server does not reply to them.
    Nodes(u32),

    /// Requires acknowledgment that the write has reached the majority of nodes.
    Majority,

    /// Requires acknowledgment according to the given custom write concern. See [here](https://www.mongodb.com/docs/manual/tutorial/configure-replica-set-tag-sets/#tag-sets-and-custom-write-concern-behavior)
    /// for more information.
    Custom(String),
}

impl From<u32> for Acknowledgment {
    fn from(i: u32) -> Self {
        Acknowledgment::Nodes(i)
    }
}

impl From<String> for Acknowledgment {
    fn from(s: String) -> Self {
        if s == "majority" {
            Acknowledgment::Majority
        } else {
            Acknowledgment::Custom(s)
        }
    }
}

impl From<&str> for Acknowledgment {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

impl Serialize for Acknowledgment {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Acknowledgment::Majority => serializer.serialize_str("majority"),
            Acknowledgment::Nodes(n) => serde_util::serialize_u32_as_i32(n, serializer),
            Acknowledgment::Custom(name) => serializer.serialize_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for Acknowledgment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum IntOrString {
            Int(u32),
            String(String),
        }
        match IntOrString::deserialize(deserializer)? {
            IntOrString::String(s) => Ok(s.into()),
            IntOrString::Int(i) => Ok(i.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Acknowledgment, WriteConcern};
    use crate::bson::doc;

    #[test]
    fn write_concern_with_w_zero_and_journaling_is_invalid() {
        let write_concern = WriteConcern::builder().w(Acknowledgment::Nodes(0)).journal(true).build();
        assert!(write_concern.validate().is_err());
    }

    #[test]
    fn acknowledgment_levels() {
        assert!(WriteConcern::majority().is_acknowledged());
        assert!(WriteConcern::builder().w(Acknowledgment::Nodes(2)).build().is_acknowledged());
        assert!(!WriteConcern::builder().w(Acknowledgment::Nodes(0)).build().is_acknowledged());
    }

    #[test]
    fn serializes_to_server_form() {
        let write_concern = WriteConcern::builder()
            .w(Acknowledgment::Majority)
            .w_timeout(std::time::Duration::from_millis(100))
            .build();
        let document = crate::bson::to_document(&write_concern).unwrap();
        assert_eq!(document, doc! { "w": "majority", "wtimeout": 100_i32 });
    }
}
