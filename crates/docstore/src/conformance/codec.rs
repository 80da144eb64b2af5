//! Codec agreement checks.

use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::{self, Complex64};

use super::check::{CheckResult, Checker};
use super::{CodecTester, UnsupportedType};

#[derive(Debug, Clone, Copy)]
enum Path {
    DocstoreToDocstore,
    DocstoreToNative,
    NativeToDocstore,
}

fn round_trip<C, T>(c: Checker, ct: &C, value: &T, path: Path, what: &str) -> CheckResult<T>
where
    C: CodecTester,
    T: Serialize + DeserializeOwned,
{
    let label = format!("{} ({:?})", what, path);
    let encoded = match path {
        Path::DocstoreToDocstore | Path::DocstoreToNative => ct.docstore_encode(value),
        Path::NativeToDocstore => ct.native_encode(value),
    };
    let encoded = c.ok(encoded, &format!("{}: encode", label))?;
    let decoded = match path {
        Path::DocstoreToDocstore | Path::NativeToDocstore => ct.docstore_decode(&encoded),
        Path::DocstoreToNative => ct.native_decode(&encoded),
    };
    c.ok(decoded, &format!("{}: decode", label))
}

fn check<C, T>(c: Checker, ct: &C, value: &T, paths: &[Path], what: &str) -> CheckResult
where
    C: CodecTester,
    T: Serialize + DeserializeOwned + PartialEq + Debug,
{
    for path in paths {
        let got = round_trip(c, ct, value, *path, what)?;
        c.eq(&got, value, &format!("{} ({:?})", what, path))?;
    }
    Ok(())
}

const CROSS: [Path; 2] = [Path::DocstoreToNative, Path::NativeToDocstore];

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct DocstoreRoundTrip {
    n: Option<i64>,
    i: i64,
    u: u64,
    f: f64,
    c: Complex64,
    st: String,
    b: bool,
    #[serde(with = "codec::bytes")]
    by: Vec<u8>,
    l: Vec<i64>,
    a: [i64; 2],
    m: BTreeMap<String, bool>,
    p: Option<String>,
    #[serde(with = "codec::timestamp")]
    t: DateTime<Utc>,
}

/// Shapes every native codec must support.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct NativeMinimal {
    n: Option<i64>,
    i: i64,
    f: f64,
    st: String,
    b: bool,
    #[serde(with = "codec::bytes")]
    by: Vec<u8>,
    l: Vec<i64>,
    m: BTreeMap<String, bool>,
    p: Option<String>,
    #[serde(with = "codec::timestamp")]
    t: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Uint {
    u: u64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Complex {
    c: Complex64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Arrays {
    a: [i64; 2],
}

/// Maps whose only key looks like an encoding wrapper.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct ReservedKeys {
    date: BTreeMap<String, i64>,
    binary: BTreeMap<String, String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct NanoTime {
    #[serde(with = "codec::timestamp")]
    t: DateTime<Utc>,
}

fn base_time(c: Checker) -> CheckResult<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2019, 3, 27, 0, 0, 0)
        .single()
        .ok_or_else(|| c.fail("invalid test time"))
}

/// Checks that the native and portable codecs of `ct` agree.
///
/// The portable codec must round-trip every shape. Between the two codecs,
/// shapes the tester declares unsupported are skipped, except nanosecond
/// times, which must then round to the nearest millisecond.
pub fn codec<C: CodecTester>(ct: &C) -> CheckResult {
    let c = Checker::new("codec");
    let milli_time = base_time(c)? + TimeDelta::milliseconds(5);
    let nano_time = milli_time + TimeDelta::nanoseconds(7);

    let mut m = BTreeMap::new();
    m.insert("a".to_string(), true);
    m.insert("b".to_string(), false);

    let full = DocstoreRoundTrip {
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
        m: m.clone(),
        p: Some("bar".to_string()),
        t: milli_time,
    };
    check(c, ct, &full, &[Path::DocstoreToDocstore], "portable round trip")?;

    let reserved = ReservedKeys {
        date: BTreeMap::from([("$date".to_string(), 5)]),
        binary: BTreeMap::from([("$binary".to_string(), "AQID".to_string())]),
    };
    check(c, ct, &reserved, &[Path::DocstoreToDocstore], "wrapper-shaped maps")?;

    let minimal = NativeMinimal {
        n: None,
        i: 1,
        f: 2.5,
        st: "foo".to_string(),
        b: true,
        by: vec![6, 7, 8],
        l: vec![3, 4, 5],
        m,
        p: Some("bar".to_string()),
        t: milli_time,
    };
    check(c, ct, &minimal, &CROSS, "minimal shapes")?;

    let unsupported = ct.unsupported_types();
    if !unsupported.contains(&UnsupportedType::Uint) {
        check(c, ct, &Uint { u: 10 }, &CROSS, "unsigned integer")?;
    }
    if !unsupported.contains(&UnsupportedType::Complex) {
        let value = Complex {
            c: Complex64::new(11.0, 12.0),
        };
        check(c, ct, &value, &CROSS, "complex number")?;
    }
    if !unsupported.contains(&UnsupportedType::Arrays) {
        check(c, ct, &Arrays { a: [13, 14] }, &CROSS, "array")?;
    }

    let nano = NanoTime { t: nano_time };
    if unsupported.contains(&UnsupportedType::NanosecondTimes) {
        let want = codec::round_to_millis(&nano_time);
        for path in CROSS {
            let got = round_trip(c, ct, &nano, path, "nanosecond time")?;
            c.eq(&got.t, &want, &format!("nanosecond time rounded to millis ({:?})", path))?;
        }
    } else {
        check(c, ct, &nano, &CROSS, "nanosecond time")?;
    }
    Ok(())
}
