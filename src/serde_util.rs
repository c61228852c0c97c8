use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use serde::{ser::Error as SerdeSerError, Deserialize, Deserializer, Serialize, Serializer};

pub(crate) fn serialize_duration_option_as_int_millis<S: Serializer>(
    val: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match val {
        Some(duration) if duration.as_millis() > i32::MAX as u128 => {
            serializer.serialize_i64(duration.as_millis() as i64)
        }
        Some(duration) => serializer.serialize_i32(duration.as_millis() as i32),
        None => serializer.serialize_none(),
    }
}

pub(crate) fn deserialize_duration_option_from_u64_millis<'de, D>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = Option::<u64>::deserialize(deserializer)?;
    Ok(millis.map(Duration::from_millis))
}

pub(crate) fn serialize_u32_as_i32<S: Serializer>(
    val: &u32,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match i32::try_from(*val) {
        Ok(val) => serializer.serialize_i32(val),
        Err(_) => Err(S::Error::custom("value does not fit into an i32")),
    }
}

/// Serializes a missing value as `true` rather than omitting the field. Used for options that
/// the server defaults to `false` but this driver defaults to `true`.
pub(crate) fn serialize_bool_or_true<S: Serializer>(
    val: &Option<bool>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let val = val.unwrap_or(true);
    serializer.serialize_bool(val)
}

/// Serializes a map keyed by operation index into a map keyed by the decimal string form of the
/// index, as external representations of results require.
pub(crate) fn serialize_indexed_map<S: Serializer, T: Serialize>(
    map: &HashMap<usize, T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let string_map: BTreeMap<String, &T> = map
        .iter()
        .map(|(index, result)| (index.to_string(), result))
        .collect();
    string_map.serialize(serializer)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::Serialize;

    #[test]
    fn indexed_maps_use_string_keys() {
        #[derive(Serialize)]
        struct Wrapper {
            #[serde(serialize_with = "super::serialize_indexed_map")]
            inner: HashMap<usize, i32>,
        }

        let wrapper = Wrapper {
            inner: [(0, 10), (7, 70)].into_iter().collect(),
        };
        let value = serde_json::to_value(&wrapper).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "inner": { "0": 10, "7": 70 } })
        );
    }
}
