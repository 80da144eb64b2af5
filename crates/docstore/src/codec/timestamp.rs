//! Serde adapter for `DateTime<Utc>` fields.
//!
//! Use with `#[serde(with = "helios_docstore::codec::timestamp")]`.
//!
//! The portable codec keeps full nanosecond precision. Human-readable
//! formats such as JSON get an extended-JSON `{"$date": <millis>}` object
//! holding the time rounded to the nearest millisecond.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};

use crate::error::CodecError;

use super::round_to_millis;

/// Newtype name that marks a time for the portable serializer.
pub(crate) const TIME_TOKEN: &str = "$__docstore_private_time";

/// Extended-JSON key for millisecond timestamps.
pub const DATE_KEY: &str = "$date";

pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(DATE_KEY, &round_to_millis(time).timestamp_millis())?;
        map.end()
    } else {
        serializer.serialize_newtype_struct(
            TIME_TOKEN,
            &time.to_rfc3339_opts(SecondsFormat::Nanos, true),
        )
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    if deserializer.is_human_readable() {
        deserializer.deserialize_any(TimeVisitor)
    } else {
        deserializer.deserialize_newtype_struct(TIME_TOKEN, TimeVisitor)
    }
}

pub(crate) fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, CodecError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CodecError::InvalidTime {
            message: format!("{}: {}", s, e),
        })
}

fn from_millis<E: de::Error>(millis: i64) -> Result<DateTime<Utc>, E> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| E::custom(format!("timestamp {}ms out of range", millis)))
}

struct TimeVisitor;

impl<'de> Visitor<'de> for TimeVisitor {
    type Value = DateTime<Utc>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an RFC 3339 string, epoch milliseconds or a {\"$date\": millis} object")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        parse_rfc3339(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        from_millis(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        let millis = i64::try_from(v).map_err(|_| E::custom("timestamp out of range"))?;
        from_millis(millis)
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut time = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == DATE_KEY || key == TIME_TOKEN {
                time = Some(map.next_value::<TimeField>()?.0);
            } else {
                map.next_value::<de::IgnoredAny>()?;
            }
        }
        time.ok_or_else(|| de::Error::missing_field(DATE_KEY))
    }
}

struct TimeField(DateTime<Utc>);

impl<'de> serde::Deserialize<'de> for TimeField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TimeVisitor).map(TimeField)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Event {
        #[serde(with = "super")]
        at: DateTime<Utc>,
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 3, 27, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_json_rounds_to_nearest_millisecond() {
        let event = Event {
            at: base() + TimeDelta::nanoseconds(5_000_007),
        };
        let json = serde_json::to_value(&event).unwrap();
        let expected = (base() + TimeDelta::milliseconds(5)).timestamp_millis();
        assert_eq!(json, serde_json::json!({ "at": { "$date": expected } }));

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.at, base() + TimeDelta::milliseconds(5));
    }

    #[test]
    fn test_json_accepts_strings_and_millis() {
        let from_str: Event =
            serde_json::from_str(r#"{"at": "2019-03-27T00:00:00.005000007Z"}"#).unwrap();
        assert_eq!(from_str.at, base() + TimeDelta::nanoseconds(5_000_007));

        let millis = base().timestamp_millis();
        let from_int: Event = serde_json::from_value(serde_json::json!({ "at": millis })).unwrap();
        assert_eq!(from_int.at, base());
    }

    #[test]
    fn test_portable_keeps_nanoseconds() {
        let event = Event {
            at: base() + TimeDelta::nanoseconds(7),
        };
        let value = crate::codec::encode(&event).unwrap();
        let back: Event = crate::codec::decode(&value).unwrap();
        assert_eq!(back, event);
    }
}
