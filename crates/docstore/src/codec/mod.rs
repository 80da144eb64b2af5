//! The portable codec.
//!
//! [`encode`] turns any `Serialize` value into a [`Value`] and [`decode`]
//! turns a [`Value`] back into any `Deserialize` type. The portable codec
//! supports every document shape; native codecs of individual backends may
//! declare some shapes unsupported (see
//! [`UnsupportedType`](crate::conformance::UnsupportedType)).
//!
//! Normalization rules:
//!
//! | Rust type | Portable value |
//! |-----------|----------------|
//! | `i8`..`i64`, `u8`..`u64` | `Int` (u64 above `i64::MAX` is an error) |
//! | `f32`, `f64` | `Float` |
//! | `Option<T>` | `Null` or the inner value |
//! | `[T; N]`, `Vec<T>`, tuples | `Array` |
//! | structs, maps | `Map` |
//! | [`Complex64`] | `Array` of two floats |
//! | `#[serde(with = "codec::bytes")]` | `Bytes` |
//! | `#[serde(with = "codec::timestamp")]` | `Time` |

pub mod bytes;
mod de;
mod ser;
pub mod timestamp;

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::document::Value;
use crate::error::CodecError;

pub use de::ValueDeserializer;
pub use ser::ValueSerializer;

/// Encodes a value with the portable codec.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value, CodecError> {
    value.serialize(ValueSerializer)
}

/// Decodes a portable value into `T`.
pub fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, CodecError> {
    T::deserialize(ValueDeserializer::new(value.clone()))
}

/// Rounds a time to the nearest millisecond; exact halves round up.
///
/// Times in the last millisecond before `DateTime::<Utc>::MAX_UTC` cannot
/// round up and are truncated instead.
pub fn round_to_millis(time: &DateTime<Utc>) -> DateTime<Utc> {
    let sub_milli = i64::from(time.timestamp_subsec_nanos() % 1_000_000);
    let floor = *time - TimeDelta::nanoseconds(sub_milli);
    if sub_milli >= 500_000 {
        floor
            .checked_add_signed(TimeDelta::milliseconds(1))
            .unwrap_or(floor)
    } else {
        floor
    }
}

/// A double-precision complex number, stored as `[re, im]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

impl Complex64 {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

impl From<(f64, f64)> for Complex64 {
    fn from((re, im): (f64, f64)) -> Self {
        Self { re, im }
    }
}

impl From<Complex64> for (f64, f64) {
    fn from(c: Complex64) -> Self {
        (c.re, c.im)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct RoundTrip {
        n: Option<i64>,
        i: i64,
        u: u32,
        f: f64,
        c: Complex64,
        st: String,
        b: bool,
        #[serde(with = "bytes")]
        by: Vec<u8>,
        l: Vec<i64>,
        a: [i64; 2],
        m: BTreeMap<String, bool>,
        p: Option<String>,
        #[serde(with = "timestamp")]
        t: DateTime<Utc>,
    }

    fn nano_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 3, 27, 0, 0, 0).unwrap() + TimeDelta::nanoseconds(5_000_007)
    }

    #[test]
    fn test_round_trip_all_shapes() {
        let mut m = BTreeMap::new();
        m.insert("a".to_string(), true);
        m.insert("b".to_string(), false);
        let value = RoundTrip {
            n: None,
            i: 1,
            u: 2,
            f: 2.5,
            c: Complex64::new(3.0, 4.0),
            st: "foo".to_string(),
            b: true,
            by: vec![6, 7, 8],
            l: vec![3, 4, 5],
            a: [6, 7],
            m,
            p: Some("bar".to_string()),
            t: nano_time(),
        };

        let encoded = encode(&value).unwrap();
        let map = encoded.as_map().unwrap();
        assert_eq!(map["n"], Value::Null);
        assert_eq!(map["u"], Value::Int(2));
        assert_eq!(map["c"], Value::Array(vec![Value::Float(3.0), Value::Float(4.0)]));
        assert_eq!(map["by"], Value::Bytes(vec![6, 7, 8]));
        assert_eq!(map["t"], Value::Time(nano_time()));

        let decoded: RoundTrip = decode(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_integer_widths_normalize_to_int() {
        assert_eq!(encode(&-8i8).unwrap(), Value::Int(-8));
        assert_eq!(encode(&16u16).unwrap(), Value::Int(16));
        assert_eq!(encode(&64u64).unwrap(), Value::Int(64));
        assert_eq!(encode(&3.5f32).unwrap(), Value::Float(3.5));
        assert!(matches!(
            encode(&u64::MAX),
            Err(CodecError::IntegerOverflow { .. })
        ));

        let narrowed: u8 = decode(&Value::Int(8)).unwrap();
        assert_eq!(narrowed, 8);
        assert!(decode::<u8>(&Value::Int(300)).is_err());
        let widened: f64 = decode(&Value::Int(3)).unwrap();
        assert_eq!(widened, 3.0);
    }

    #[test]
    fn test_hash_map_with_integer_keys() {
        let mut m = HashMap::new();
        m.insert(1u32, "one".to_string());
        let encoded = encode(&m).unwrap();
        assert_eq!(encoded.as_map().unwrap()["1"], Value::from("one"));
        let back: HashMap<u32, String> = decode(&encoded).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_enums() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        enum Shape {
            Empty,
            Circle(f64),
            Rect { w: i64, h: i64 },
        }

        for shape in [Shape::Empty, Shape::Circle(1.5), Shape::Rect { w: 2, h: 3 }] {
            let encoded = encode(&shape).unwrap();
            let back: Shape = decode(&encoded).unwrap();
            assert_eq!(back, shape);
        }
        assert_eq!(encode(&Shape::Empty).unwrap(), Value::from("Empty"));

        let unknown = Value::Map(BTreeMap::from([("Hexagon".to_string(), Value::Int(6))]));
        assert!(decode::<Shape>(&unknown).is_err());
    }

    #[test]
    fn test_fixed_array_length_checked() {
        let value = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(decode::<[i64; 2]>(&value).is_err());
    }

    #[test]
    fn test_value_is_its_own_encoding() {
        let mut map = BTreeMap::new();
        map.insert("t".to_string(), Value::Time(nano_time()));
        map.insert("b".to_string(), Value::Bytes(vec![1]));
        let value = Value::Map(map);
        assert_eq!(encode(&value).unwrap(), value);
        assert_eq!(decode::<Value>(&value).unwrap(), value);
    }

    #[test]
    fn test_round_to_millis_is_nearest() {
        let base = Utc.with_ymd_and_hms(2019, 3, 27, 0, 0, 0).unwrap();
        let down = base + TimeDelta::nanoseconds(5_000_007);
        assert_eq!(round_to_millis(&down), base + TimeDelta::milliseconds(5));

        let up = base + TimeDelta::nanoseconds(5_600_000);
        assert_eq!(round_to_millis(&up), base + TimeDelta::milliseconds(6));

        let half = base + TimeDelta::nanoseconds(5_500_000);
        assert_eq!(round_to_millis(&half), base + TimeDelta::milliseconds(6));

        let exact = base + TimeDelta::milliseconds(5);
        assert_eq!(round_to_millis(&exact), exact);
    }

    #[test]
    fn test_round_to_millis_at_max_time_truncates() {
        let max = DateTime::<Utc>::MAX_UTC;
        let rounded = round_to_millis(&max);
        assert_eq!(rounded.timestamp_millis(), max.timestamp_millis());
        assert_eq!(rounded.timestamp_subsec_nanos() % 1_000_000, 0);

        let json = serde_json::to_value(Wrapper { t: max }).unwrap();
        assert_eq!(json["t"]["$date"], serde_json::json!(max.timestamp_millis()));
    }

    #[derive(Serialize)]
    struct Wrapper {
        #[serde(with = "timestamp")]
        t: DateTime<Utc>,
    }
}
