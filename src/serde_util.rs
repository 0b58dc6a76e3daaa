use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

use crate::bson::{Bson, Document};

/// Serializes a duration as whole milliseconds, using an int32 when it fits.
pub(crate) fn serialize_duration_option_as_int_millis<S: Serializer>(
    val: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match val {
        Some(duration) => match i32::try_from(duration.as_millis()) {
            Ok(millis) => serializer.serialize_i32(millis),
            Err(_) => serializer.serialize_i64(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)),
        },
        None => serializer.serialize_none(),
    }
}

pub(crate) fn deserialize_duration_option_from_u64_millis<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = Option::<u64>::deserialize(deserializer)?;
    Ok(millis.map(Duration::from_millis))
}

#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) fn serialize_u32_option_as_i32<S: Serializer>(
    val: &Option<u32>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match val.map(i32::try_from) {
        Some(Ok(v)) => serializer.serialize_i32(v),
        Some(Err(_)) => Err(serde::ser::Error::custom("value exceeds the range of an int32")),
        None => serializer.serialize_none(),
    }
}

/// Converts a duration into the `maxTimeMS` value the server expects, saturating at `i32::MAX`.
pub(crate) fn max_time_ms(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

/// Reads an integer field regardless of which BSON integer (or double) type carries it.
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if (f - (f as i64 as f64)).abs() <= f64::EPSILON => Some(f as i64),
        _ => None,
    }
}

/// Returns the first key of the document, which for a command is its name.
pub(crate) fn first_key(document: &Document) -> Option<&str> {
    document.keys().next().map(String::as_str)
}

/// The encoded size of `document` in bytes.
pub(crate) fn document_size(document: &Document) -> crate::error::Result<usize> {
    let mut bytes = Vec::new();
    document.to_writer(&mut bytes)?;
    Ok(bytes.len())
}

pub(crate) fn replacement_document_check(replacement: &Document) -> crate::error::Result<()> {
    match first_key(replacement) {
        Some(key) if key.starts_with('$') => Err(crate::error::Error::invalid_argument(
            "replace document must have first key not starting with '$'",
        )),
        _ => Ok(()),
    }
}

pub(crate) fn update_document_check(update: &Document) -> crate::error::Result<()> {
    match first_key(update) {
        Some(key) if key.starts_with('$') => Ok(()),
        _ => Err(crate::error::Error::invalid_argument(
            "update document must have first key starting with '$'",
        )),
    }
}
