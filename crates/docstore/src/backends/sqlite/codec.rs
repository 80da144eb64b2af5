//! JSON encoding of portable values for SQLite storage.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value as Json};

use crate::codec::bytes::{BINARY_KEY, decode_base64, encode_base64};
use crate::codec::timestamp::DATE_KEY;
use crate::codec::{self, round_to_millis};
use crate::conformance::{CodecTester, UnsupportedType};
use crate::document::Value;
use crate::error::{CodecError, DocstoreResult};

/// Wraps user maps that would otherwise read back as a `$date`/`$binary`
/// wrapper.
pub const MAP_KEY: &str = "$map";

/// Converts a portable value to the JSON stored in the `data` column.
pub fn value_to_json(value: &Value) -> Result<Json, CodecError> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| CodecError::Unrepresentable {
                expected: "finite float".to_string(),
                found: f.to_string(),
            })?,
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => single_entry(BINARY_KEY, Json::String(encode_base64(b))),
        Value::Array(items) => {
            Json::Array(items.iter().map(value_to_json).collect::<Result<_, _>>()?)
        }
        Value::Map(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (name, field) in fields {
                map.insert(name.clone(), value_to_json(field)?);
            }
            if is_wrapper_shaped(fields) {
                single_entry(MAP_KEY, Json::Object(map))
            } else {
                Json::Object(map)
            }
        }
        Value::Time(t) => single_entry(
            DATE_KEY,
            Json::Number(Number::from(round_to_millis(t).timestamp_millis())),
        ),
    })
}

/// A single-entry map keyed by a `$` name collides with the wrappers.
fn is_wrapper_shaped(fields: &BTreeMap<String, Value>) -> bool {
    fields.len() == 1 && fields.keys().all(|name| name.starts_with('$'))
}

fn single_entry(key: &str, value: Json) -> Json {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), value);
    Json::Object(map)
}

/// Converts stored JSON back into a portable value.
pub fn json_to_value(json: &Json) -> Result<Value, CodecError> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => number_to_value(n)?,
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => {
            Value::Array(items.iter().map(json_to_value).collect::<Result<_, _>>()?)
        }
        Json::Object(map) => {
            if map.len() == 1 {
                if let Some(Json::Object(escaped)) = map.get(MAP_KEY) {
                    return object_to_value(escaped);
                }
            }
            match special_value(map)? {
                Some(special) => special,
                None => object_to_value(map)?,
            }
        }
    })
}

fn object_to_value(map: &Map<String, Json>) -> Result<Value, CodecError> {
    let mut fields = BTreeMap::new();
    for (name, field) in map {
        fields.insert(name.clone(), json_to_value(field)?);
    }
    Ok(Value::Map(fields))
}

fn number_to_value(n: &Number) -> Result<Value, CodecError> {
    if let Some(i) = n.as_i64() {
        Ok(Value::Int(i))
    } else if let Some(u) = n.as_u64() {
        Err(CodecError::IntegerOverflow { value: u })
    } else {
        n.as_f64()
            .map(Value::Float)
            .ok_or_else(|| CodecError::Message(format!("unsupported number {}", n)))
    }
}

/// Recognizes the `$date` and `$binary` wrappers.
fn special_value(map: &Map<String, Json>) -> Result<Option<Value>, CodecError> {
    if map.len() != 1 {
        return Ok(None);
    }
    match (map.get(DATE_KEY), map.get(BINARY_KEY)) {
        (Some(Json::Number(n)), _) => {
            let millis = n.as_i64().ok_or_else(|| CodecError::InvalidTime {
                message: format!("{} is not a millisecond timestamp", n),
            })?;
            DateTime::from_timestamp_millis(millis)
                .map(|t| Some(Value::Time(t)))
                .ok_or_else(|| CodecError::InvalidTime {
                    message: format!("{} is out of range", millis),
                })
        }
        (_, Some(Json::String(s))) => decode_base64(s)
            .map(|b| Some(Value::Bytes(b)))
            .map_err(|e| CodecError::Message(format!("invalid base64: {}", e))),
        _ => Ok(None),
    }
}

/// Checks the SQLite JSON encoding against the portable codec.
///
/// The native encoding is plain `serde_json`; the portable path goes
/// through [`Value`] and [`value_to_json`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteCodecTester;

impl CodecTester for SqliteCodecTester {
    type Native = Json;

    fn unsupported_types(&self) -> Vec<UnsupportedType> {
        vec![UnsupportedType::NanosecondTimes]
    }

    fn native_encode<T: Serialize>(&self, value: &T) -> DocstoreResult<Json> {
        Ok(serde_json::to_value(value)?)
    }

    fn native_decode<T: DeserializeOwned>(&self, native: &Json) -> DocstoreResult<T> {
        Ok(serde_json::from_value(native.clone())?)
    }

    fn docstore_encode<T: Serialize>(&self, value: &T) -> DocstoreResult<Json> {
        Ok(value_to_json(&codec::encode(value)?)?)
    }

    fn docstore_decode<T: DeserializeOwned>(&self, native: &Json) -> DocstoreResult<T> {
        Ok(codec::decode(&json_to_value(native)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(value_to_json(&Value::Int(-3)).unwrap(), json!(-3));
        assert_eq!(value_to_json(&Value::Float(1.5)).unwrap(), json!(1.5));
        assert_eq!(json_to_value(&json!(7)).unwrap(), Value::Int(7));
        assert_eq!(json_to_value(&json!(2.0)).unwrap(), Value::Float(2.0));
        assert!(value_to_json(&Value::Float(f64::NAN)).is_err());
    }

    #[test]
    fn test_large_unsigned_is_rejected() {
        let err = json_to_value(&json!(u64::MAX)).unwrap_err();
        assert!(matches!(err, CodecError::IntegerOverflow { .. }));
    }

    #[test]
    fn test_time_rounds_to_millis() {
        let t = Utc.with_ymd_and_hms(2019, 3, 27, 0, 0, 0).unwrap()
            + TimeDelta::nanoseconds(5_600_000);
        let stored = value_to_json(&Value::Time(t)).unwrap();
        assert_eq!(stored, json!({ "$date": 1553644800006i64 }));
        assert_eq!(
            json_to_value(&stored).unwrap(),
            Value::Time(
                Utc.with_ymd_and_hms(2019, 3, 27, 0, 0, 0).unwrap() + TimeDelta::milliseconds(6)
            )
        );
    }

    #[test]
    fn test_bytes() {
        let stored = value_to_json(&Value::Bytes(vec![1, 2, 3])).unwrap();
        assert_eq!(stored, json!({ "$binary": "AQID" }));
        assert_eq!(json_to_value(&stored).unwrap(), Value::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn test_wrapper_shaped_user_maps_are_escaped() {
        for key in ["$date", "$binary", "$map", "$other"] {
            let mut fields = BTreeMap::new();
            fields.insert(key.to_string(), Value::Int(5));
            let value = Value::Map(fields);

            let stored = value_to_json(&value).unwrap();
            assert_eq!(stored, json!({ "$map": { key: 5 } }));
            assert_eq!(json_to_value(&stored).unwrap(), value);
        }

        let mut inner = BTreeMap::new();
        inner.insert("$binary".to_string(), Value::String("AQID".to_string()));
        let mut outer = BTreeMap::new();
        outer.insert("$map".to_string(), Value::Map(inner));
        let nested = Value::Map(outer);
        let stored = value_to_json(&nested).unwrap();
        assert_eq!(json_to_value(&stored).unwrap(), nested);
    }

    #[test]
    fn test_plain_maps_are_not_escaped() {
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), Value::Int(1));
        assert_eq!(value_to_json(&Value::Map(fields)).unwrap(), json!({ "a": 1 }));
    }

    #[test]
    fn test_wrapper_with_extra_keys_is_a_map() {
        let value = json_to_value(&json!({ "$date": 1, "other": true })).unwrap();
        assert!(value.as_map().is_some());
    }

    #[test]
    fn test_codec_tester_paths_agree() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct S {
            n: i64,
            s: String,
            #[serde(with = "crate::codec::bytes")]
            b: Vec<u8>,
        }
        let value = S {
            n: 4,
            s: "x".to_string(),
            b: vec![9],
        };
        let tester = SqliteCodecTester;
        let native = tester.native_encode(&value).unwrap();
        let portable = tester.docstore_encode(&value).unwrap();
        assert_eq!(native, portable);
        let back: S = tester.docstore_decode(&native).unwrap();
        assert_eq!(back, value);
    }
}
